use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decision::{TradeAction, TradeLogEntry};
use crate::error::ValidationError;
use crate::market::Market;

/// Fields an advice request must carry. `historys` may be omitted and then
/// counts as empty.
pub const REQUIRED_FIELDS: [&str; 9] = [
    "symbol",
    "market",
    "riskPrefer",
    "strategyPrefer",
    "llmSettings",
    "holdAmount",
    "remaining",
    "callbackUrl",
    "id",
];

pub const MAX_LLM_SETTINGS: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskPreference {
    RiskAverse,
    Stable,
    RiskSeeking,
}

impl RiskPreference {
    pub const KEYS: [&'static str; 3] = ["risk_averse", "stable", "risk_seeking"];

    pub fn describe(&self) -> &'static str {
        match self {
            RiskPreference::RiskAverse => "risk-averse",
            RiskPreference::Stable => "steady, moderate-risk",
            RiskPreference::RiskSeeking => "risk-seeking",
        }
    }
}

/// Model and sampling temperature for one LLM pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSetting {
    pub model: String,
    pub temperature: f64,
}

/// A prior trade as reported by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct History {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub action: TradeAction,
    #[serde(default)]
    pub buy_cost: Option<Decimal>,
    #[serde(default)]
    pub sell_amount: Option<Decimal>,
    #[serde(default)]
    pub position_ratio: Option<Decimal>,
    pub price: Decimal,
    pub summary: String,
}

impl History {
    pub fn date(&self) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp).map(|dt| dt.date_naive())
    }

    /// Convert to a trade log entry; `None` when the record cannot be
    /// expressed as an executed trade.
    pub fn to_log_entry(&self) -> Option<TradeLogEntry> {
        let date = self.date()?;
        let (amount, cost) = match self.action {
            TradeAction::Buy => {
                let cost = self.buy_cost?;
                if self.price <= Decimal::ZERO {
                    return None;
                }
                (cost.checked_div(self.price)?, cost)
            }
            TradeAction::Sell => {
                let amount = self.sell_amount?;
                (amount, amount.checked_mul(self.price)?)
            }
            TradeAction::Hold => return None,
        };
        Some(TradeLogEntry {
            date,
            action: self.action,
            amount,
            cost,
            price: self.price,
            position_ratio: self.position_ratio.unwrap_or(Decimal::ZERO),
            summary: self.summary.clone(),
        })
    }
}

/// Inbound request for a single trading advice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdviceRequest {
    pub symbol: String,
    pub market: Market,
    pub risk_prefer: RiskPreference,
    /// Free text; well-known keys such as `long_term` are expanded in prompts.
    pub strategy_prefer: String,
    pub llm_settings: Vec<LlmSetting>,
    #[serde(default)]
    pub historys: Vec<History>,
    pub hold_amount: Decimal,
    pub remaining: Decimal,
    pub callback_url: String,
    pub id: String,
}

impl AdviceRequest {
    pub fn from_json_str(body: &str) -> Result<Self, ValidationError> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| ValidationError::Malformed(format!("invalid JSON: {e}")))?;
        Self::from_json(&value)
    }

    /// Parse and validate a request body. Runs before any advisory work.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or_else(|| {
            ValidationError::Malformed("request body must be a JSON object".to_string())
        })?;

        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|field| obj.get(**field).is_none_or(|v| v.is_null()))
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        check_enum(obj, "market", &["crypto", "stock"])?;
        check_enum(obj, "riskPrefer", &RiskPreference::KEYS)?;

        let request: AdviceRequest = serde_json::from_value(value.clone())
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        non_blank("symbol", &self.symbol)?;
        non_blank("callbackUrl", &self.callback_url)?;
        non_blank("id", &self.id)?;

        if self.llm_settings.is_empty() || self.llm_settings.len() > MAX_LLM_SETTINGS {
            return Err(ValidationError::invalid(
                "llmSettings",
                format!("expected 1 to {MAX_LLM_SETTINGS} entries, got {}", self.llm_settings.len()),
            ));
        }
        for setting in &self.llm_settings {
            non_blank("llmSettings.model", &setting.model)?;
            if !(0.0..=1.0).contains(&setting.temperature) {
                return Err(ValidationError::invalid(
                    "llmSettings.temperature",
                    format!("{} is outside 0..=1", setting.temperature),
                ));
            }
        }

        if self.hold_amount < Decimal::ZERO {
            return Err(ValidationError::invalid("holdAmount", "must be >= 0"));
        }
        if self.remaining < Decimal::ZERO {
            return Err(ValidationError::invalid("remaining", "must be >= 0"));
        }

        for (i, history) in self.historys.iter().enumerate() {
            let field = format!("historys[{i}]");
            match history.action {
                TradeAction::Buy if history.buy_cost.is_none() => {
                    return Err(ValidationError::invalid(field, "buyCost is required for buy"));
                }
                TradeAction::Sell if history.sell_amount.is_none() => {
                    return Err(ValidationError::invalid(field, "sellAmount is required for sell"));
                }
                TradeAction::Hold => {
                    return Err(ValidationError::invalid(field, "action must be buy or sell"));
                }
                _ => {}
            }
            if history.price < Decimal::ZERO {
                return Err(ValidationError::invalid(field, "price must be >= 0"));
            }
        }
        Ok(())
    }

    /// Prior trades as log entries, oldest first.
    pub fn trade_log(&self) -> Vec<TradeLogEntry> {
        let mut log: Vec<TradeLogEntry> =
            self.historys.iter().filter_map(History::to_log_entry).collect();
        log.sort_by_key(|entry| entry.date);
        log
    }
}

fn check_enum(
    obj: &serde_json::Map<String, serde_json::Value>,
    field: &str,
    allowed: &[&str],
) -> Result<(), ValidationError> {
    let value = obj.get(field).and_then(|v| v.as_str());
    match value {
        Some(v) if allowed.contains(&v) => Ok(()),
        Some(v) => Err(ValidationError::invalid(
            field,
            format!("'{v}' is not one of {}", allowed.join("|")),
        )),
        None => Err(ValidationError::invalid(field, "must be a string")),
    }
}

fn non_blank(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::invalid(field, "must not be empty"));
    }
    Ok(())
}
