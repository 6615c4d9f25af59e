//! In-memory collaborators for simulator tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tradesage_agents::{ChatModel, NewsSummarizer, ToolAgent, ToolRegistry, TradeAdvisor};
use tradesage_models::advice_request::RiskPreference;
use tradesage_models::config::{BacktestConfig, ModelParams};
use tradesage_models::decision::Decision;
use tradesage_models::ledger::LedgerState;
use tradesage_models::market::{DateRange, Market, NewsItem, PriceBar};
use tradesage_models::record::{DailyRecord, DayPhase};

use crate::error::DataError;
use crate::providers::{FillConfirmation, NewsProvider, PriceHistoryProvider, TradeExecutor};
use crate::simulator::{ProgressObserver, RunRequest, Simulator};

/// A simulator whose summarizer and advisor both talk to `model`, with no
/// tools registered.
pub fn scripted_simulator(
    model: Arc<dyn ChatModel>,
    prices: Arc<dyn PriceHistoryProvider>,
    news: Arc<dyn NewsProvider>,
    config: BacktestConfig,
) -> Simulator {
    let agent = Arc::new(ToolAgent::new(
        model,
        Arc::new(ToolRegistry::new()),
        Duration::from_secs(5),
    ));
    Simulator::new(
        prices,
        news,
        NewsSummarizer::new(agent.clone(), 3),
        TradeAdvisor::new(agent, 3),
        config,
    )
}

/// A crypto run request over `start..=end` with empty trade history.
pub fn run_request(symbol: &str, start: NaiveDate, end: NaiveDate, initial: LedgerState) -> RunRequest {
    RunRequest {
        symbol: symbol.to_string(),
        market: Market::Crypto,
        range: DateRange::new(start, end),
        initial,
        risk: RiskPreference::Stable,
        strategy: "trend_following".to_string(),
        summarizer: ModelParams::new("summarizer-test", 0.0),
        advisor: ModelParams::new("advisor-test", 0.0),
        history: Vec::new(),
    }
}

/// Flat bars on consecutive calendar days starting at `start`.
pub fn daily_bars(start: NaiveDate, closes: &[Decimal]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| PriceBar::flat(start + chrono::Duration::days(i as i64), *close))
        .collect()
}

/// Serves a fixed bar list, filtered to the requested range.
pub struct StaticPriceHistory {
    bars: Vec<PriceBar>,
}

impl StaticPriceHistory {
    pub fn new(bars: Vec<PriceBar>) -> Self {
        Self { bars }
    }
}

#[async_trait]
impl PriceHistoryProvider for StaticPriceHistory {
    async fn get(&self, _symbol: &str, range: DateRange) -> Result<Vec<PriceBar>, DataError> {
        Ok(self
            .bars
            .iter()
            .filter(|b| range.contains(b.date))
            .cloned()
            .collect())
    }
}

/// News keyed by day; days without an entry have no news.
#[derive(Default)]
pub struct StaticNews {
    by_day: HashMap<NaiveDate, Vec<NewsItem>>,
}

impl StaticNews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, date: NaiveDate, title: &str) -> Self {
        let published_at = date
            .and_hms_opt(8, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        self.by_day.entry(date).or_default().push(NewsItem {
            title: title.to_string(),
            description: String::new(),
            published_at,
            url: None,
            platform: "test".to_string(),
        });
        self
    }
}

#[async_trait]
impl NewsProvider for StaticNews {
    async fn get(&self, _symbol: &str, date: NaiveDate) -> Result<Vec<NewsItem>, DataError> {
        Ok(self.by_day.get(&date).cloned().unwrap_or_default())
    }
}

/// Fills every decision in full and remembers it.
#[derive(Default)]
pub struct RecordingExecutor {
    executed: Mutex<Vec<(String, Decision, Decimal)>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> Vec<(String, Decision, Decimal)> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TradeExecutor for RecordingExecutor {
    async fn execute(
        &self,
        symbol: &str,
        decision: &Decision,
        price: Decimal,
    ) -> Result<FillConfirmation, DataError> {
        let mut executed = self
            .executed
            .lock()
            .map_err(|e| DataError::Execution(format!("executor lock poisoned: {e}")))?;
        executed.push((symbol.to_string(), decision.clone(), price));
        Ok(FillConfirmation {
            order_id: format!("test-{}", executed.len()),
            symbol: symbol.to_string(),
            action: decision.action,
            filled_amount: decision.amount,
            price,
            filled_at: Utc::now(),
        })
    }
}

/// Records every phase change and appended record.
#[derive(Default)]
pub struct RecordingObserver {
    phases: Mutex<Vec<(usize, DayPhase)>>,
    records: Mutex<Vec<DailyRecord>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self) -> Vec<(usize, DayPhase)> {
        self.phases.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn records(&self) -> Vec<DailyRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_phase(&self, day_index: usize, _date: NaiveDate, phase: DayPhase) {
        if let Ok(mut phases) = self.phases.lock() {
            phases.push((day_index, phase));
        }
    }

    fn on_record(&self, _day_index: usize, record: &DailyRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}
