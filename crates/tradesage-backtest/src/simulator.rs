use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tradesage_agents::{AdvisoryInput, AgentError, NewsSummarizer, TradeAdvisor};
use tradesage_models::advice_request::RiskPreference;
use tradesage_models::config::{BacktestConfig, FailurePolicy, ModelParams};
use tradesage_models::decision::{Decision, TradeLogEntry};
use tradesage_models::ledger::LedgerState;
use tradesage_models::market::{DateRange, Market, PriceBar};
use tradesage_models::record::{DailyRecord, DayAnomaly, DayPhase, RunStatus};
use uuid::Uuid;

use crate::error::{DataError, SimulationError};
use crate::indicators::standard_readings;
use crate::ledger::{Fill, Ledger};
use crate::providers::{NewsProvider, PriceHistoryProvider};

/// Extra calendar days fetched before a run so indicators have history on
/// the first simulated day.
const INDICATOR_LOOKBACK_DAYS: i64 = 40;

/// Progress callbacks. Both default to no-ops.
pub trait ProgressObserver: Send + Sync {
    fn on_phase(&self, _day_index: usize, _date: NaiveDate, _phase: DayPhase) {}

    fn on_record(&self, _day_index: usize, _record: &DailyRecord) {}
}

pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// One backtest or advice run: what to trade, from which account, with
/// which models and preferences.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub symbol: String,
    pub market: Market,
    pub range: DateRange,
    pub initial: LedgerState,
    pub risk: RiskPreference,
    pub strategy: String,
    pub summarizer: ModelParams,
    pub advisor: ModelParams,
    /// Trades made before the run, oldest first.
    pub history: Vec<TradeLogEntry>,
}

/// Everything a run produced, including partial results of an aborted or
/// cancelled run.
#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub run_id: Uuid,
    pub symbol: String,
    pub initial: LedgerState,
    /// Chronological; each record's ledger follows from the previous one.
    pub records: Vec<DailyRecord>,
    pub status: RunStatus,
    pub trade_log: Vec<TradeLogEntry>,
}

impl BacktestRun {
    pub fn final_ledger(&self) -> LedgerState {
        self.records
            .last()
            .map(|r| r.ledger_after)
            .unwrap_or(self.initial)
    }
}

/// Summarizer and advisor output for one day, before it touches the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct DayAdvice {
    pub digest: String,
    pub decision: Decision,
    pub anomaly: Option<DayAnomaly>,
}

impl DayAdvice {
    fn failed(error: &AgentError) -> Self {
        Self {
            digest: String::new(),
            decision: Decision::hold(format!("advisory failed: {error}")),
            anomaly: Some(DayAnomaly::AdvisoryFailed(error.to_string())),
        }
    }
}

/// A single advised and applied day.
#[derive(Debug, Clone)]
pub struct SingleDay {
    pub date: NaiveDate,
    pub price: Decimal,
    pub advice: DayAdvice,
    pub fill: Fill,
}

/// Drives the day-by-day state machine
/// `Pending → Summarizing → Advising → Applying → Recorded`.
///
/// Days run strictly in order. Shared parts (providers, agents) carry no
/// run state, so one simulator serves many concurrent runs.
pub struct Simulator {
    prices: Arc<dyn PriceHistoryProvider>,
    news: Arc<dyn NewsProvider>,
    summarizer: NewsSummarizer,
    advisor: TradeAdvisor,
    config: BacktestConfig,
}

impl Simulator {
    pub fn new(
        prices: Arc<dyn PriceHistoryProvider>,
        news: Arc<dyn NewsProvider>,
        summarizer: NewsSummarizer,
        advisor: TradeAdvisor,
        config: BacktestConfig,
    ) -> Self {
        Self {
            prices,
            news,
            summarizer,
            advisor,
            config,
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    fn lookback(&self) -> Duration {
        Duration::days(i64::from(self.config.price_window_days) * 2 + INDICATOR_LOOKBACK_DAYS)
    }

    /// Sorted, de-duplicated bars from `start` through `end`.
    async fn load_bars(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>, DataError> {
        let mut bars = self.prices.get(symbol, DateRange::new(start, end)).await?;
        bars.retain(|b| b.date >= start && b.date <= end);
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Ok(bars)
    }

    /// Summarize and advise one day. `bars` ends at the simulated day.
    pub async fn advise_day(
        &self,
        request: &RunRequest,
        day_index: usize,
        bars: &[PriceBar],
        ledger: &LedgerState,
        trade_log: &[TradeLogEntry],
        observer: &dyn ProgressObserver,
    ) -> Result<DayAdvice, AgentError> {
        let Some(today) = bars.last() else {
            return Ok(DayAdvice {
                digest: String::new(),
                decision: Decision::hold("no price data"),
                anomaly: None,
            });
        };
        let date = today.date;

        observer.on_phase(day_index, date, DayPhase::Summarizing);
        let news = match self.news.get(&request.symbol, date).await {
            Ok(news) => news,
            Err(e) => {
                warn!(symbol = %request.symbol, day = %date, error = %e, "News unavailable, summarizing none");
                Vec::new()
            }
        };
        let digest = self
            .summarizer
            .summarize(request.market, &request.symbol, date, &news, &request.summarizer)
            .await?;

        observer.on_phase(day_index, date, DayPhase::Advising);
        let window_start = bars.len().saturating_sub(self.config.price_window_days.max(1) as usize);
        let history_start = trade_log.len().saturating_sub(self.config.history_limit);
        let input = AdvisoryInput {
            symbol: request.symbol.clone(),
            market: request.market,
            date,
            bars: bars[window_start..].to_vec(),
            indicators: standard_readings(bars),
            digest: digest.clone(),
            ledger: *ledger,
            history: trade_log[history_start..].to_vec(),
            risk: request.risk,
            strategy: request.strategy.clone(),
        };
        let advice = self.advisor.advise(&input, &request.advisor).await?;

        Ok(DayAdvice {
            digest,
            decision: advice.decision,
            anomaly: advice.anomaly,
        })
    }

    /// Advise and apply the latest trading day on or before `as_of`.
    /// Recoverable advisory failures degrade to hold; others are returned.
    pub async fn advise_once(&self, request: &RunRequest, as_of: NaiveDate) -> Result<SingleDay, SimulationError> {
        let start = as_of - self.lookback();
        let bars = self.load_bars(&request.symbol, start, as_of).await?;
        let Some(today) = bars.last() else {
            return Err(DataError::NoPrices {
                symbol: request.symbol.clone(),
                start,
                end: as_of,
            }
            .into());
        };
        let (date, price) = (today.date, today.close);

        let advice = match self
            .advise_day(request, 0, &bars, &request.initial, &request.history, &NoopObserver)
            .await
        {
            Ok(advice) => advice,
            Err(e) if e.is_day_recoverable() => {
                warn!(symbol = %request.symbol, day = %date, error = %e, "Advisory failed, holding");
                DayAdvice::failed(&e)
            }
            Err(e) => return Err(e.into()),
        };
        let fill = Ledger::execute(&request.initial, &advice.decision, price);
        Ok(SingleDay {
            date,
            price,
            advice,
            fill,
        })
    }

    /// Run every trading day in `request.range`, checking `cancel` before
    /// each day. Provider rejections and the failure policy end the run
    /// early with an `Aborted` status; records up to that point are kept.
    pub async fn run(
        &self,
        request: &RunRequest,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<BacktestRun, SimulationError> {
        let started = Instant::now();
        let range = request.range;
        let bars = self
            .load_bars(&request.symbol, range.start - self.lookback(), range.end)
            .await?;
        let days: Vec<usize> = bars
            .iter()
            .enumerate()
            .filter(|(_, b)| range.contains(b.date))
            .map(|(i, _)| i)
            .collect();
        if days.is_empty() {
            return Err(SimulationError::EmptyRange {
                start: range.start,
                end: range.end,
            });
        }

        let run_id = Uuid::new_v4();
        info!(%run_id, symbol = %request.symbol, start = %range.start, end = %range.end, days = days.len(), "Backtest started");

        let mut ledger = request.initial;
        let mut trade_log = request.history.clone();
        let mut records: Vec<DailyRecord> = Vec::with_capacity(days.len());
        let mut status = RunStatus::Completed;
        let mut consecutive_failures = 0u32;

        for (day_index, &pos) in days.iter().enumerate() {
            let today = &bars[pos];
            let date = today.date;
            if cancel.is_cancelled() {
                info!(%run_id, day = %date, completed = records.len(), "Backtest cancelled");
                status = RunStatus::Cancelled { next_day: date };
                break;
            }
            observer.on_phase(day_index, date, DayPhase::Pending);

            let (advice, failure) = match self
                .advise_day(request, day_index, &bars[..=pos], &ledger, &trade_log, observer)
                .await
            {
                Ok(advice) => (advice, None),
                Err(e) if e.is_day_recoverable() => {
                    warn!(%run_id, day = %date, error = %e, "Advisory failed, holding for the day");
                    (DayAdvice::failed(&e), Some(e))
                }
                Err(e) => {
                    error!(%run_id, day = %date, day_index, error = %e, "Backtest aborted");
                    status = RunStatus::Aborted {
                        day_index,
                        date,
                        error: e.to_string(),
                    };
                    break;
                }
            };

            observer.on_phase(day_index, date, DayPhase::Applying);
            let close = today.close;
            let fill = Ledger::execute(&ledger, &advice.decision, close);
            ledger = fill.state;
            if fill.filled_amount > Decimal::ZERO {
                trade_log.push(TradeLogEntry {
                    date,
                    action: advice.decision.action,
                    amount: fill.filled_amount,
                    cost: fill.cost,
                    price: close,
                    position_ratio: ledger.position_ratio(close),
                    summary: if advice.decision.summary.is_empty() {
                        advice.decision.rationale.clone()
                    } else {
                        advice.decision.summary.clone()
                    },
                });
            }

            let record = DailyRecord {
                date,
                price_close: close,
                decision: advice.decision,
                filled_amount: fill.filled_amount,
                ledger_after: ledger,
                equity: ledger.equity(close),
                digest: advice.digest,
                anomaly: advice.anomaly,
            };
            info!(
                %run_id,
                day = %date,
                action = %record.decision.action,
                filled = %record.filled_amount,
                equity = %record.equity,
                "Day recorded"
            );
            observer.on_phase(day_index, date, DayPhase::Recorded);
            observer.on_record(day_index, &record);
            records.push(record);

            match failure {
                Some(e) => {
                    consecutive_failures += 1;
                    if let FailurePolicy::AbortAfter { consecutive } = self.config.failure_policy {
                        if consecutive_failures >= consecutive.max(1) {
                            error!(%run_id, day = %date, consecutive_failures, "Failure threshold reached, aborting");
                            status = RunStatus::Aborted {
                                day_index,
                                date,
                                error: format!("{consecutive_failures} consecutive advisory failures; last: {e}"),
                            };
                            break;
                        }
                    }
                }
                None => consecutive_failures = 0,
            }
        }

        info!(
            %run_id,
            symbol = %request.symbol,
            days = records.len(),
            trades = trade_log.len() - request.history.len(),
            status = ?status,
            elapsed_ms = started.elapsed().as_millis(),
            "Backtest finished"
        );
        Ok(BacktestRun {
            run_id,
            symbol: request.symbol.clone(),
            initial: request.initial,
            records,
            status,
            trade_log,
        })
    }
}
