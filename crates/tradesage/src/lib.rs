//! TradeSage - LLM trading advice and daily backtesting
//!
//! Summarizes each day's news, asks a tool-using advisor model for a
//! buy/sell/hold decision, applies it to a simulated ledger and compares the
//! result against buy-and-hold.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tradesage::models::{AdviceRequest, TradeSageConfig};
//! use tradesage::backtest::{Simulator, NoopObserver};
//! use tradesage::{build_chat_model, build_services, advise, backtest};
//! ```

pub use tradesage_agents as agents;
pub use tradesage_backtest as backtest;
pub use tradesage_models as models;

pub mod sources;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tradesage_agents::{
    format_for, AgentError, ChatModel, Gateway, HttpTransport, LlmClient, NewsSummarizer, ToolAgent,
    ToolRegistry, TradeAdvisor,
};
use tradesage_backtest::{
    build_report, FillConfirmation, IndicatorTool, NewsProvider, PriceHistoryProvider, PriceHistoryTool,
    ProgressObserver, RunRequest, SimulationError, Simulator, TradeExecutor,
};
use tradesage_models::advice_request::AdviceRequest;
use tradesage_models::config::{GatewayConfig, ModelParams, TradeSageConfig};
use tradesage_models::decision::{Decision, TradeAction, TradeLogEntry};
use tradesage_models::ledger::LedgerState;
use tradesage_models::market::{DateRange, Market};
use tradesage_models::record::{BacktestReport, DailyRecord, DayAnomaly};

/// Chat model over the configured provider family and endpoint pair.
pub fn build_chat_model(config: &GatewayConfig, api_key: String) -> Result<Arc<dyn ChatModel>, AgentError> {
    let transport = Arc::new(HttpTransport::new()?);
    let gateway = Arc::new(Gateway::from_config(config, api_key, transport));
    Ok(Arc::new(LlmClient::new(gateway, format_for(config.provider))))
}

/// Everything a run needs, shared by concurrent runs.
pub struct Services {
    pub simulator: Simulator,
    pub executor: Option<Arc<dyn TradeExecutor>>,
    pub config: TradeSageConfig,
}

impl Services {
    /// Run request for `advice` over `range`, seeded from its account and
    /// trade history. The first `llmSettings` entry drives the advisor.
    pub fn request_for(&self, advice: &AdviceRequest, range: DateRange) -> RunRequest {
        let advisor = advice
            .llm_settings
            .first()
            .map(ModelParams::from)
            .unwrap_or_else(|| self.config.agents.advisor.clone());
        RunRequest {
            symbol: advice.symbol.clone(),
            market: advice.market,
            range,
            initial: LedgerState::new(advice.remaining, advice.hold_amount),
            risk: advice.risk_prefer,
            strategy: advice.strategy_prefer.clone(),
            summarizer: self.config.agents.summarizer.clone(),
            advisor,
            history: advice.trade_log(),
        }
    }
}

/// Wire the agents and trading tools around `model`.
pub fn build_services(
    config: &TradeSageConfig,
    model: Arc<dyn ChatModel>,
    prices: Arc<dyn PriceHistoryProvider>,
    news: Arc<dyn NewsProvider>,
    executor: Option<Arc<dyn TradeExecutor>>,
) -> Result<Services, AgentError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(PriceHistoryTool::new(prices.clone())))?;
    registry.register(Arc::new(IndicatorTool::new(prices.clone())))?;

    let agent = Arc::new(ToolAgent::new(
        model,
        Arc::new(registry),
        Duration::from_secs(config.agents.tool_timeout_seconds),
    ));
    let rounds = config.agents.max_tool_rounds;
    let simulator = Simulator::new(
        prices,
        news,
        NewsSummarizer::new(agent.clone(), rounds),
        TradeAdvisor::new(agent, rounds),
        config.backtest.clone(),
    );

    Ok(Services {
        simulator,
        executor,
        config: config.clone(),
    })
}

/// Result of one advice request, delivered to its callback.
#[derive(Debug, Clone, Serialize)]
pub struct AdviceOutcome {
    pub id: String,
    pub symbol: String,
    /// Trading day the decision was made for.
    pub date: NaiveDate,
    pub decision: Decision,
    pub price: Decimal,
    /// Units the ledger actually traded after clamping.
    pub filled_amount: Decimal,
    pub ledger_after: LedgerState,
    pub position_ratio: Decimal,
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<DayAnomaly>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<FillConfirmation>,
}

/// Advise on the latest trading day up to `as_of` for a validated request.
///
/// Crypto decisions that trade are forwarded to the executor, if one is
/// configured, at the clamped amount.
pub async fn advise(
    services: &Services,
    request: &AdviceRequest,
    as_of: NaiveDate,
) -> Result<AdviceOutcome, SimulationError> {
    let run = services.request_for(request, DateRange::new(as_of, as_of));
    let day = services.simulator.advise_once(&run, as_of).await?;

    let decision = day.advice.decision;
    let mut fill = None;
    if let Some(executor) = &services.executor {
        if request.market == Market::Crypto
            && decision.action != TradeAction::Hold
            && day.fill.filled_amount > Decimal::ZERO
        {
            let order = Decision {
                amount: day.fill.filled_amount,
                ..decision.clone()
            };
            let confirmation = executor.execute(&request.symbol, &order, day.price).await?;
            tracing::info!(
                id = %request.id,
                order_id = %confirmation.order_id,
                action = %confirmation.action,
                filled = %confirmation.filled_amount,
                "Order executed"
            );
            fill = Some(confirmation);
        }
    }

    let ledger_after = day.fill.state;
    Ok(AdviceOutcome {
        id: request.id.clone(),
        symbol: request.symbol.clone(),
        date: day.date,
        decision,
        price: day.price,
        filled_amount: day.fill.filled_amount,
        ledger_after,
        position_ratio: ledger_after.position_ratio(day.price),
        digest: day.advice.digest,
        anomaly: day.advice.anomaly,
        fill,
    })
}

/// A finished (or stopped) backtest with its benchmark comparison.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestOutcome {
    pub report: BacktestReport,
    pub records: Vec<DailyRecord>,
    pub trade_log: Vec<TradeLogEntry>,
}

pub async fn backtest(
    services: &Services,
    request: &RunRequest,
    observer: &dyn ProgressObserver,
    cancel: &CancellationToken,
) -> Result<BacktestOutcome, SimulationError> {
    let run = services.simulator.run(request, observer, cancel).await?;
    let report = build_report(&run);
    Ok(BacktestOutcome {
        report,
        records: run.records,
        trade_log: run.trade_log,
    })
}
