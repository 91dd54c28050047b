//! CLI binary for multi-provider trading-signal consensus.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use quorum_consensus::{
    ExecutionMode, FailurePolicy, QuorumConfig, StaticMarketData, TickerAnalyzer,
};
use quorum_llm::{parse_response, LlmClient};
use quorum_types::ProviderId;

#[derive(Parser)]
#[command(name = "quorum", version, about = "Ask several LLM providers for a trading signal and reach a consensus")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more tickers and print the report as JSON
    Analyze {
        /// Tickers to analyze (e.g. AAPL MSFT)
        #[arg(required = true)]
        tickers: Vec<String>,

        /// Comma-separated providers (default: every configured provider)
        #[arg(short, long, value_delimiter = ',')]
        providers: Vec<ProviderId>,

        /// sequential or parallel
        #[arg(long)]
        mode: Option<ExecutionMode>,

        /// Delay between providers in sequential mode, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Retries after a rate-limit response before giving up on a provider
        #[arg(long)]
        max_retries: Option<u32>,

        /// drop or placeholder
        #[arg(long)]
        failure_policy: Option<FailurePolicy>,

        /// JSON file with market context keyed by ticker
        #[arg(long)]
        context: Option<PathBuf>,

        /// JSON config file (rate_limit, retry, orchestrator)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pretty-print the JSON report
        #[arg(long)]
        pretty: bool,
    },

    /// List providers and whether their credentials are set
    Providers,

    /// Run the response parser on saved model output
    Parse {
        /// File with the raw model text, or - for stdin
        input: PathBuf,

        /// Provider to attribute the result to
        #[arg(long, default_value = "openai")]
        provider: ProviderId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Analyze {
            tickers,
            providers,
            mode,
            delay_ms,
            max_retries,
            failure_policy,
            context,
            config,
            pretty,
        } => {
            let mut config = load_config(config.as_deref())?;
            apply_overrides(&mut config, mode, delay_ms, max_retries, failure_policy);
            cmd_analyze(&tickers, providers, &config, context.as_deref(), pretty).await?;
        }
        Commands::Providers => {
            cmd_providers();
        }
        Commands::Parse { input, provider } => {
            cmd_parse(&input, provider)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<QuorumConfig> {
    match path {
        Some(path) => QuorumConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(QuorumConfig::default()),
    }
}

fn apply_overrides(
    config: &mut QuorumConfig,
    mode: Option<ExecutionMode>,
    delay_ms: Option<u64>,
    max_retries: Option<u32>,
    failure_policy: Option<FailurePolicy>,
) {
    if let Some(mode) = mode {
        config.orchestrator.mode = mode;
    }
    if let Some(ms) = delay_ms {
        config.orchestrator.inter_provider_delay = std::time::Duration::from_millis(ms);
    }
    if let Some(n) = max_retries {
        config.retry.max_retries = n;
    }
    if let Some(policy) = failure_policy {
        config.orchestrator.failure_policy = policy;
    }
}

async fn cmd_analyze(
    tickers: &[String],
    requested: Vec<ProviderId>,
    config: &QuorumConfig,
    context: Option<&Path>,
    pretty: bool,
) -> anyhow::Result<()> {
    let client = config.client_from_env();
    let providers = select_providers(&client, requested)?;

    let mut analyzer = TickerAnalyzer::new(config.build_orchestrator(Arc::new(client)));
    if let Some(path) = context {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read market context {}", path.display()))?;
        let data = StaticMarketData::from_json(serde_json::from_str(&raw)?)?;
        tracing::info!(tickers = data.len(), path = %path.display(), "Loaded market context");
        analyzer = analyzer.with_market_data(data);
    }

    tracing::info!(
        tickers = tickers.len(),
        providers = ?providers,
        mode = %config.orchestrator.mode,
        "Starting analysis"
    );
    let report = analyzer.analyze_batch(tickers, &providers).await?;

    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}

/// Explicit providers are used as given (unconfigured ones fail per call);
/// otherwise every configured provider is used.
fn select_providers(client: &LlmClient, requested: Vec<ProviderId>) -> anyhow::Result<Vec<ProviderId>> {
    if !requested.is_empty() {
        return Ok(requested);
    }
    let configured = client.configured_providers();
    if configured.is_empty() {
        let vars: Vec<&str> = ProviderId::ALL.iter().map(|p| p.api_key_env()).collect();
        anyhow::bail!("no provider is configured; set one of {}", vars.join(", "));
    }
    Ok(configured)
}

fn cmd_providers() {
    let client = QuorumConfig::default().client_from_env();

    println!("{:<10} {:<18} {:<11} {}", "PROVIDER", "API KEY", "CONFIGURED", "MODEL");
    for provider in ProviderId::ALL {
        let configured = client.is_configured(provider);
        println!(
            "{:<10} {:<18} {:<11} {}",
            provider.as_str(),
            provider.api_key_env(),
            if configured { "yes" } else { "no" },
            client.model_for(provider).unwrap_or("-"),
        );
    }
}

fn cmd_parse(input: &Path, provider: ProviderId) -> anyhow::Result<()> {
    let raw = if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))?
    };

    let outcome = parse_response(&raw);
    if !outcome.is_structured() {
        tracing::warn!("Input is not JSON; result comes from keyword fallback");
    }
    let result = outcome.into_signal_result(provider);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn analyze_args_parse() {
        let cli = Cli::try_parse_from([
            "quorum",
            "analyze",
            "AAPL",
            "msft",
            "--providers",
            "openai,groq",
            "--mode",
            "parallel",
            "--failure-policy",
            "placeholder",
            "--delay-ms",
            "500",
        ])
        .unwrap();

        let Commands::Analyze {
            tickers,
            providers,
            mode,
            failure_policy,
            delay_ms,
            ..
        } = cli.command
        else {
            panic!("expected analyze");
        };
        assert_eq!(tickers, ["AAPL", "msft"]);
        assert_eq!(providers, [ProviderId::OpenAi, ProviderId::Groq]);
        assert_eq!(mode, Some(ExecutionMode::Parallel));
        assert_eq!(failure_policy, Some(FailurePolicy::Placeholder));
        assert_eq!(delay_ms, Some(500));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(Cli::try_parse_from(["quorum", "analyze", "AAPL", "-p", "mistral"]).is_err());
        assert!(Cli::try_parse_from(["quorum", "analyze"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let mut config = QuorumConfig::default();
        apply_overrides(
            &mut config,
            Some(ExecutionMode::Parallel),
            Some(0),
            Some(1),
            None,
        );
        assert_eq!(config.orchestrator.mode, ExecutionMode::Parallel);
        assert_eq!(config.orchestrator.inter_provider_delay, Duration::ZERO);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.orchestrator.failure_policy, FailurePolicy::Drop);
    }

    #[test]
    fn explicit_providers_are_kept() {
        let client = QuorumConfig::default().client_from_env();
        let selected = select_providers(&client, vec![ProviderId::Gemini]).unwrap();
        assert_eq!(selected, [ProviderId::Gemini]);
    }
}
