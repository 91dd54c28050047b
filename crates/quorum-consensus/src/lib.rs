//! Multi-provider orchestration and consensus for trading signals.
//!
//! This crate fans a prompt out to the configured LLM providers, collects
//! their parsed signals, and reduces them to a single majority-vote
//! `ConsensusResult`. `TickerAnalyzer` wraps that flow with market context
//! and prompt construction for batches of tickers.

pub mod aggregator;
pub mod analyzer;
pub mod config;
pub mod orchestrator;

pub use aggregator::aggregate;
pub use analyzer::{
    AnalysisReport, MarketDataSource, PromptBuilder, ReportMetadata, SignalPromptBuilder,
    StaticMarketData, TickerAnalysis, TickerAnalyzer,
};
pub use config::QuorumConfig;
pub use orchestrator::{ExecutionMode, FailurePolicy, Orchestrator, OrchestratorConfig};
