pub mod advice_request;
pub mod config;
pub mod conversation;
pub mod decision;
pub mod error;
pub mod ledger;
pub mod market;
pub mod record;
pub mod tool;

pub use advice_request::{AdviceRequest, History, LlmSetting, RiskPreference};
pub use config::{
    AgentsConfig, BacktestConfig, FailurePolicy, GatewayConfig, ModelParams, ProviderKind,
    TradeSageConfig,
};
pub use conversation::{Conversation, Role, Turn};
pub use decision::{Decision, TradeAction, TradeLogEntry};
pub use error::ValidationError;
pub use ledger::LedgerState;
pub use market::{DateRange, Market, NewsItem, PriceBar};
pub use record::{
    BacktestReport, CurveStats, DailyRecord, DayAnomaly, DayPhase, EquityPoint, RunStatus,
};
pub use tool::{ToolCallRequest, ToolContext, ToolOutcome, ToolResult, ToolSchema, ToolSelection};
