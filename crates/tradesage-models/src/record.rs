use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::Decision;
use crate::ledger::LedgerState;

/// Why a day's decision did not come straight from the advisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DayAnomaly {
    /// The advisor answered but the answer was not a usable decision.
    Unparsable(String),
    /// The summarizer or advisor round failed (provider outage, tool loop).
    AdvisoryFailed(String),
}

/// One simulated day. Immutable once appended to a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub price_close: Decimal,
    pub decision: Decision,
    /// Asset units actually bought or sold after clamping.
    pub filled_amount: Decimal,
    pub ledger_after: LedgerState,
    pub equity: Decimal,
    #[serde(default)]
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<DayAnomaly>,
}

/// Phase of the current day in the simulator's state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DayPhase {
    Pending,
    Summarizing,
    Advising,
    Applying,
    Recorded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Stopped by the caller between days.
    Cancelled { next_day: NaiveDate },
    Aborted {
        day_index: usize,
        date: NaiveDate,
        error: String,
    },
}

/// Aligned point of the advisor and buy-and-hold equity curves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub ai_equity: Decimal,
    pub benchmark_equity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurveStats {
    pub initial: Decimal,
    pub final_equity: Decimal,
    /// (final - initial) / initial.
    pub total_return: Decimal,
    /// Largest peak-to-trough fall as a fraction of the running peak.
    pub max_drawdown: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestReport {
    pub run_id: Uuid,
    pub symbol: String,
    pub status: RunStatus,
    pub series: Vec<EquityPoint>,
    pub ai: CurveStats,
    pub benchmark: CurveStats,
}
