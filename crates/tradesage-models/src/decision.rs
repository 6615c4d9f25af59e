use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
            TradeAction::Hold => "hold",
        };
        f.write_str(s)
    }
}

/// One day's trading decision. `amount` is in asset units and is always
/// zero for `Hold`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub action: TradeAction,
    pub amount: Decimal,
    pub rationale: String,
    /// Short recap kept in the trade log.
    #[serde(default)]
    pub summary: String,
}

impl Decision {
    pub fn hold(rationale: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Hold,
            amount: Decimal::ZERO,
            rationale: rationale.into(),
            summary: String::new(),
        }
    }

    pub fn buy(amount: Decimal, rationale: impl Into<String>) -> Self {
        Self::trade(TradeAction::Buy, amount, rationale)
    }

    pub fn sell(amount: Decimal, rationale: impl Into<String>) -> Self {
        Self::trade(TradeAction::Sell, amount, rationale)
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// A buy or sell with a non-positive amount collapses to hold.
    fn trade(action: TradeAction, amount: Decimal, rationale: impl Into<String>) -> Self {
        if amount <= Decimal::ZERO {
            return Self::hold(rationale);
        }
        Self {
            action,
            amount,
            rationale: rationale.into(),
            summary: String::new(),
        }
    }
}

/// A past executed trade, carried forward into later advisor prompts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeLogEntry {
    pub date: NaiveDate,
    pub action: TradeAction,
    /// Asset units bought or sold.
    pub amount: Decimal,
    /// Quote currency spent (buy) or received (sell).
    pub cost: Decimal,
    pub price: Decimal,
    /// Share of equity held in the asset after the trade, 0..=1.
    pub position_ratio: Decimal,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn hold_has_zero_amount() {
        let d = Decision::hold("flat market");
        assert_eq!(d.action, TradeAction::Hold);
        assert_eq!(d.amount, Decimal::ZERO);
    }

    #[test]
    fn zero_buy_collapses_to_hold() {
        let d = Decision::buy(Decimal::ZERO, "nothing to do");
        assert_eq!(d.action, TradeAction::Hold);
        let d = Decision::sell(dec!(-1), "negative");
        assert_eq!(d.action, TradeAction::Hold);
        assert_eq!(d.amount, Decimal::ZERO);
    }

    #[test]
    fn action_serialization() {
        assert_eq!(serde_json::to_string(&TradeAction::Buy).unwrap(), "\"buy\"");
        assert_eq!(TradeAction::Sell.to_string(), "sell");
    }
}
