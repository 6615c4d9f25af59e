use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Value};
use tradesage_agents::Tool;
use tradesage_models::market::{DateRange, PriceBar};
use tradesage_models::tool::ToolContext;

use crate::indicators::{bollinger, closes, rsi, sma};
use crate::providers::PriceHistoryProvider;

const MAX_DAYS: u64 = 120;

/// Bars up to `ctx.as_of`, oldest first. Never reveals later data.
async fn bars_until(
    prices: &dyn PriceHistoryProvider,
    ctx: &ToolContext,
    days: u64,
) -> Result<Vec<PriceBar>, String> {
    // Calendar lookback wide enough to cover weekends and holidays.
    let lookback = Duration::days((days * 2 + 10) as i64);
    let range = DateRange::new(ctx.as_of - lookback, ctx.as_of);
    let mut bars: Vec<PriceBar> = prices
        .get(&ctx.symbol, range)
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .filter(|b| b.date <= ctx.as_of)
        .collect();
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    let skip = bars.len().saturating_sub(days as usize);
    Ok(bars.split_off(skip))
}

/// `price_history`: the last N daily bars.
pub struct PriceHistoryTool {
    prices: Arc<dyn PriceHistoryProvider>,
}

impl PriceHistoryTool {
    pub fn new(prices: Arc<dyn PriceHistoryProvider>) -> Self {
        Self { prices }
    }
}

#[async_trait]
impl Tool for PriceHistoryTool {
    fn name(&self) -> &str {
        "price_history"
    }

    fn description(&self) -> &str {
        "Daily OHLCV bars for the traded symbol, most recent last, ending at the current trading day."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "days": {"type": "integer", "description": "Number of trading days, 1-120"}
            },
            "required": ["days"]
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<String, String> {
        let days = args
            .get("days")
            .and_then(Value::as_u64)
            .ok_or("'days' must be a positive integer")?
            .clamp(1, MAX_DAYS);
        let bars = bars_until(self.prices.as_ref(), ctx, days).await?;
        if bars.is_empty() {
            return Err(format!("no price data for {} up to {}", ctx.symbol, ctx.as_of));
        }
        serde_json::to_string(&bars).map_err(|e| e.to_string())
    }
}

/// `indicator`: latest SMA, RSI or Bollinger bands.
pub struct IndicatorTool {
    prices: Arc<dyn PriceHistoryProvider>,
}

impl IndicatorTool {
    pub fn new(prices: Arc<dyn PriceHistoryProvider>) -> Self {
        Self { prices }
    }
}

#[async_trait]
impl Tool for IndicatorTool {
    fn name(&self) -> &str {
        "indicator"
    }

    fn description(&self) -> &str {
        "Latest value of a technical indicator computed over daily closes up to the current trading day."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "enum": ["sma", "rsi", "bollinger"]},
                "period": {"type": "integer", "description": "Lookback period; defaults to 20 (sma, bollinger) or 14 (rsi)"}
            },
            "required": ["name"]
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<String, String> {
        let name = args.get("name").and_then(Value::as_str).unwrap_or_default();
        let default_period = if name == "rsi" { 14 } else { 20 };
        let period = args
            .get("period")
            .and_then(Value::as_u64)
            .unwrap_or(default_period)
            .clamp(2, MAX_DAYS - 1);

        let bars = bars_until(self.prices.as_ref(), ctx, MAX_DAYS).await?;
        let closes = closes(&bars);
        let period_usize = period as usize;
        let not_enough = || format!("not enough history for {name}({period}): {} closes", closes.len());

        let value = match name {
            "sma" => json!(sma(&closes, period_usize).ok_or_else(not_enough)?),
            "rsi" => json!(rsi(&closes, period_usize).ok_or_else(not_enough)?),
            "bollinger" => json!(bollinger(&closes, period_usize, 2.0).ok_or_else(not_enough)?),
            other => return Err(format!("unknown indicator '{other}'")),
        };
        Ok(json!({
            "name": name,
            "period": period,
            "as_of": ctx.as_of,
            "value": value,
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{daily_bars, StaticPriceHistory};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn ctx(day: u32) -> ToolContext {
        ToolContext {
            symbol: "BTC/USDT".to_string(),
            as_of: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
        }
    }

    fn prices() -> Arc<dyn PriceHistoryProvider> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let closes: Vec<_> = (0..30).map(|i| dec!(100) + rust_decimal::Decimal::from(i)).collect();
        Arc::new(StaticPriceHistory::new(daily_bars(start, &closes)))
    }

    #[tokio::test]
    async fn price_history_stops_at_as_of() {
        let tool = PriceHistoryTool::new(prices());
        let body = tool.call(json!({"days": 3}), &ctx(10)).await.unwrap();
        let bars: Vec<PriceBar> = serde_json::from_str(&body).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars.last().unwrap().date, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert_eq!(bars.last().unwrap().close, dec!(109));
    }

    #[tokio::test]
    async fn indicator_sma() {
        let tool = IndicatorTool::new(prices());
        let body = tool.call(json!({"name": "sma", "period": 5}), &ctx(10)).await.unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["value"], json!(107.0));
        assert_eq!(value["as_of"], "2024-01-10");
    }

    #[tokio::test]
    async fn indicator_needs_history() {
        let tool = IndicatorTool::new(prices());
        let err = tool.call(json!({"name": "rsi"}), &ctx(5)).await.unwrap_err();
        assert!(err.contains("not enough history"));
    }

    #[tokio::test]
    async fn bollinger_returns_bands() {
        let tool = IndicatorTool::new(prices());
        let body = tool.call(json!({"name": "bollinger", "period": 10}), &ctx(20)).await.unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();
        assert!(value["value"]["upper"].as_f64().unwrap() > value["value"]["lower"].as_f64().unwrap());
    }
}
