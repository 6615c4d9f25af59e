use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tradesage::sources::{JsonNews, JsonPriceHistory};
use tradesage_backtest::{NewsProvider, NoopObserver};
use tradesage_models::advice_request::AdviceRequest;
use tradesage_models::config::TradeSageConfig;
use tradesage_models::market::DateRange;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tradesage", about = "LLM trading advice and daily backtesting")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tradesage.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct DataArgs {
    /// JSON price history keyed by symbol
    #[arg(long)]
    prices: String,

    /// JSON news keyed by symbol; no news when omitted
    #[arg(long)]
    news: Option<String>,

    /// Read the advice request JSON from a file instead of stdin
    #[arg(short, long)]
    input: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Advise on one trading day
    Advise {
        #[command(flatten)]
        data: DataArgs,

        /// Trading day to advise on (defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Replay the advisor day by day and compare against buy-and-hold
    Backtest {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long)]
        start: NaiveDate,

        #[arg(long)]
        end: NaiveDate,
    },
}

fn read_request(input: Option<&str>) -> Result<AdviceRequest> {
    let body = if let Some(path) = input {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read input: {path}"))?
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };
    AdviceRequest::from_json_str(&body).context("Invalid advice request")
}

fn build(config: &TradeSageConfig, data: &DataArgs) -> Result<tradesage::Services> {
    let api_key = std::env::var(&config.gateway.api_key_env)
        .with_context(|| format!("Missing API key: set {}", config.gateway.api_key_env))?;
    let model = tradesage::build_chat_model(&config.gateway, api_key).context("Failed to build LLM client")?;

    let prices = Arc::new(JsonPriceHistory::load(&data.prices).context("Failed to load price history")?);
    let news: Arc<dyn NewsProvider> = match &data.news {
        Some(path) => Arc::new(JsonNews::load(path).context("Failed to load news")?),
        None => Arc::new(JsonNews::empty()),
    };

    tradesage::build_services(config, model, prices, news, None).context("Failed to build services")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: TradeSageConfig = toml::from_str(&config_str).context("Failed to parse config")?;

    let output = match &cli.command {
        Command::Advise { data, date } => {
            let request = read_request(data.input.as_deref())?;
            let services = build(&config, data)?;
            let as_of = date.unwrap_or_else(|| Utc::now().date_naive());
            let outcome = tradesage::advise(&services, &request, as_of)
                .await
                .map_err(|e| anyhow::anyhow!("Advice failed: {e}"))?;
            serde_json::to_value(&outcome)?
        }
        Command::Backtest { data, start, end } => {
            let request = read_request(data.input.as_deref())?;
            let range = DateRange::new(*start, *end);
            anyhow::ensure!(!range.is_empty(), "start {start} is after end {end}");
            let services = build(&config, data)?;
            let run = services.request_for(&request, range);

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, stopping after the current day");
                    on_ctrl_c.cancel();
                }
            });

            let outcome = tradesage::backtest(&services, &run, &NoopObserver, &cancel)
                .await
                .map_err(|e| anyhow::anyhow!("Backtest failed: {e}"))?;
            serde_json::to_value(&outcome)?
        }
    };

    let output = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{output}");

    Ok(())
}
