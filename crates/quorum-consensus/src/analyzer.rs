//! Per-ticker analysis: market context, prompt construction, consensus.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quorum_types::{ConsensusResult, Prompt, ProviderId, QuorumError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::orchestrator::{ExecutionMode, FailurePolicy, Orchestrator};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Turns a ticker and its market context into the prompt sent to every provider.
pub trait PromptBuilder: Send + Sync {
    fn build(&self, ticker: &str, context: &Value) -> Prompt;
}

/// Supplies market context for a ticker. The shape of the value is opaque to
/// the engine and only consumed by the prompt builder.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(&self, ticker: &str) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// StaticMarketData
// ---------------------------------------------------------------------------

/// Fixed context per ticker, typically loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    by_ticker: HashMap<String, Value>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticker(mut self, ticker: &str, context: Value) -> Self {
        self.by_ticker.insert(ticker.trim().to_uppercase(), context);
        self
    }

    /// Build from a JSON object keyed by ticker.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(QuorumError::InvalidRequest(
                "market context must be a JSON object keyed by ticker".into(),
            ));
        };
        Ok(map
            .into_iter()
            .fold(Self::new(), |data, (ticker, context)| data.with_ticker(&ticker, context)))
    }

    pub fn len(&self) -> usize {
        self.by_ticker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ticker.is_empty()
    }
}

#[async_trait]
impl MarketDataSource for StaticMarketData {
    async fn fetch(&self, ticker: &str) -> Result<Value> {
        Ok(self
            .by_ticker
            .get(ticker)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }
}

// ---------------------------------------------------------------------------
// SignalPromptBuilder
// ---------------------------------------------------------------------------

const SIGNAL_SYSTEM_PROMPT: &str = "You are a disciplined equity analyst. \
Assess the stock using only the information provided and your general knowledge. \
Respond with a single JSON object and nothing else, in exactly this format: \
{\"signal\": \"BULLISH\" | \"BEARISH\" | \"NEUTRAL\", \"confidence\": <integer 0-100>, \
\"reasoning\": \"<at most three sentences>\"}";

/// Default prompt asking for a `{"signal","confidence","reasoning"}` object.
#[derive(Debug, Clone)]
pub struct SignalPromptBuilder {
    system: String,
}

impl SignalPromptBuilder {
    pub fn new() -> Self {
        Self {
            system: SIGNAL_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }
}

impl Default for SignalPromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder for SignalPromptBuilder {
    fn build(&self, ticker: &str, context: &Value) -> Prompt {
        let has_context = match context {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            _ => true,
        };

        let mut user = format!("Analyze {ticker} for an investment decision.");
        if has_context {
            let rendered =
                serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
            user.push_str("\n\nMarket data:\n");
            user.push_str(&rendered);
        } else {
            user.push_str("\n\nNo market data is available; rely on general knowledge.");
        }
        Prompt::new(self.system.clone(), user)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerAnalysis {
    pub id: Uuid,
    pub ticker: String,
    pub consensus: ConsensusResult,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub providers: Vec<ProviderId>,
    pub mode: ExecutionMode,
    pub failure_policy: FailurePolicy,
    pub total_tickers: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analyses: Vec<TickerAnalysis>,
    pub metadata: ReportMetadata,
}

// ---------------------------------------------------------------------------
// TickerAnalyzer
// ---------------------------------------------------------------------------

pub struct TickerAnalyzer {
    orchestrator: Orchestrator,
    market_data: Arc<dyn MarketDataSource>,
    prompt_builder: Arc<dyn PromptBuilder>,
}

impl TickerAnalyzer {
    /// Analyzer with no market data and the default signal prompt.
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            market_data: Arc::new(StaticMarketData::new()),
            prompt_builder: Arc::new(SignalPromptBuilder::new()),
        }
    }

    pub fn with_market_data(mut self, source: impl MarketDataSource + 'static) -> Self {
        self.market_data = Arc::new(source);
        self
    }

    pub fn with_prompt_builder(mut self, builder: impl PromptBuilder + 'static) -> Self {
        self.prompt_builder = Arc::new(builder);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn analyze(&self, ticker: &str, providers: &[ProviderId]) -> Result<TickerAnalysis> {
        let ticker = normalize_ticker(ticker)?;
        self.analyze_normalized(ticker, providers).await
    }

    /// Analyze each ticker in order. All tickers are validated before any
    /// provider is called.
    pub async fn analyze_batch(
        &self,
        tickers: &[String],
        providers: &[ProviderId],
    ) -> Result<AnalysisReport> {
        if tickers.is_empty() {
            return Err(QuorumError::InvalidRequest(
                "at least one ticker is required".into(),
            ));
        }
        let normalized = tickers
            .iter()
            .map(|t| normalize_ticker(t))
            .collect::<Result<Vec<_>>>()?;

        let mut analyses = Vec::with_capacity(normalized.len());
        for ticker in normalized {
            analyses.push(self.analyze_normalized(ticker, providers).await?);
        }

        let config = self.orchestrator.config();
        Ok(AnalysisReport {
            metadata: ReportMetadata {
                providers: providers.to_vec(),
                mode: config.mode,
                failure_policy: config.failure_policy,
                total_tickers: analyses.len(),
                timestamp: Utc::now(),
            },
            analyses,
        })
    }

    async fn analyze_normalized(
        &self,
        ticker: String,
        providers: &[ProviderId],
    ) -> Result<TickerAnalysis> {
        let context = match self.market_data.fetch(&ticker).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(ticker = %ticker, error = %e, "Market data unavailable, continuing without it");
                Value::Object(Map::new())
            }
        };

        let prompt = self.prompt_builder.build(&ticker, &context);
        tracing::info!(ticker = %ticker, providers = providers.len(), "Analyzing ticker");
        let consensus = self.orchestrator.consensus(providers, &prompt).await?;

        Ok(TickerAnalysis {
            id: Uuid::new_v4(),
            ticker,
            consensus,
            timestamp: Utc::now(),
        })
    }
}

fn normalize_ticker(raw: &str) -> Result<String> {
    let ticker = raw.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(QuorumError::InvalidRequest("ticker must not be empty".into()));
    }
    Ok(ticker)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
