use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tradesage_models::decision::{Decision, TradeAction};
use tradesage_models::market::{DateRange, NewsItem, PriceBar};

use crate::error::DataError;

/// Daily bars for a symbol. Implementations return bars in any order; the
/// simulator sorts them.
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    async fn get(&self, symbol: &str, range: DateRange) -> Result<Vec<PriceBar>, DataError>;
}

/// News published about a symbol on one day.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn get(&self, symbol: &str, date: NaiveDate) -> Result<Vec<NewsItem>, DataError>;
}

/// Exchange's acknowledgement of an executed decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FillConfirmation {
    pub order_id: String,
    pub symbol: String,
    pub action: TradeAction,
    pub filled_amount: Decimal,
    pub price: Decimal,
    pub filled_at: DateTime<Utc>,
}

/// Live order placement, used for crypto advice only.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn execute(
        &self,
        symbol: &str,
        decision: &Decision,
        price: Decimal,
    ) -> Result<FillConfirmation, DataError>;
}
