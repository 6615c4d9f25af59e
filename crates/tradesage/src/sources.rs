//! File-backed collaborators for the command-line tool.
//!
//! Both files are JSON objects keyed by symbol:
//! `{"BTC/USDT": [{"date": "2024-01-01", "open": "…", …}]}` for prices and
//! `{"BTC/USDT": [{"title": "…", "published_at": "…", "platform": "…"}]}`
//! for news.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use tradesage_backtest::{DataError, NewsProvider, PriceHistoryProvider};
use tradesage_models::market::{DateRange, NewsItem, PriceBar};

fn read_keyed<T: serde::de::DeserializeOwned>(path: &Path) -> Result<HashMap<String, Vec<T>>, DataError> {
    let body = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&body)?)
}

pub struct JsonPriceHistory {
    bars: HashMap<String, Vec<PriceBar>>,
}

impl JsonPriceHistory {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let bars = read_keyed(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), symbols = bars.len(), "Loaded price history");
        Ok(Self { bars })
    }
}

#[async_trait]
impl PriceHistoryProvider for JsonPriceHistory {
    async fn get(&self, symbol: &str, range: DateRange) -> Result<Vec<PriceBar>, DataError> {
        let Some(bars) = self.bars.get(symbol) else {
            return Err(DataError::NoPrices {
                symbol: symbol.to_string(),
                start: range.start,
                end: range.end,
            });
        };
        Ok(bars.iter().filter(|b| range.contains(b.date)).cloned().collect())
    }
}

/// News grouped by symbol. A missing file or symbol means no news.
#[derive(Default)]
pub struct JsonNews {
    items: HashMap<String, Vec<NewsItem>>,
}

impl JsonNews {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let items = read_keyed(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), symbols = items.len(), "Loaded news");
        Ok(Self { items })
    }
}

#[async_trait]
impl NewsProvider for JsonNews {
    async fn get(&self, symbol: &str, date: NaiveDate) -> Result<Vec<NewsItem>, DataError> {
        Ok(self
            .items
            .get(symbol)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.published_at.date_naive() == date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[tokio::test]
    async fn prices_filter_by_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"BTC/USDT": [
                {{"date": "2024-01-01", "open": "1", "high": "1", "low": "1", "close": "1"}},
                {{"date": "2024-01-02", "open": "2", "high": "2", "low": "2", "close": "2"}},
                {{"date": "2024-01-03", "open": "3", "high": "3", "low": "3", "close": "3"}}
            ]}}"#
        )
        .unwrap();
        let source = JsonPriceHistory::load(file.path()).unwrap();

        let bars = source.get("BTC/USDT", DateRange::new(d(2), d(3))).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, d(2));

        let err = source.get("ETH/USDT", DateRange::new(d(1), d(3))).await.unwrap_err();
        assert!(matches!(err, DataError::NoPrices { .. }));
    }

    #[tokio::test]
    async fn news_filter_by_day() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"BTC/USDT": [
                {{"title": "a", "published_at": "2024-01-01T09:00:00Z", "platform": "cointime"}},
                {{"title": "b", "published_at": "2024-01-02T23:59:00Z", "platform": "cointime"}}
            ]}}"#
        )
        .unwrap();
        let news = JsonNews::load(file.path()).unwrap();

        let day_two = news.get("BTC/USDT", d(2)).await.unwrap();
        assert_eq!(day_two.len(), 1);
        assert_eq!(day_two[0].title, "b");
        assert!(news.get("ETH/USDT", d(2)).await.unwrap().is_empty());
        assert!(JsonNews::empty().get("BTC/USDT", d(1)).await.unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = JsonPriceHistory::load("/nonexistent/prices.json").err().unwrap();
        assert!(matches!(err, DataError::Io(_)));
    }
}
