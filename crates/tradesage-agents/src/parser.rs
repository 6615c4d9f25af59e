use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tradesage_models::decision::Decision;

use crate::error::AgentError;

/// Extract the first JSON object from a model answer that may carry prose.
///
/// Handles:
/// - Clean JSON: `{"action": "hold"}`
/// - Fenced: ```json\n{"action": "hold"}\n```
/// - Prefix text: `My call for today:\n{"action": "hold"}`
pub fn extract_json(text: &str) -> Result<Value, AgentError> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Ok(value);
        }
    }

    let fenced = extract_from_fence(trimmed);
    let candidates = fenced.as_deref().into_iter().chain(object_candidates(trimmed));
    for candidate in candidates {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

/// Body of the first ``` fence, with or without a language tag.
fn extract_from_fence(text: &str) -> Option<String> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim().to_string())
}

/// Every balanced `{ ... }` starting at each `{`, in order. Braces inside
/// strings are skipped.
fn object_candidates(text: &str) -> impl Iterator<Item = &str> + '_ {
    text.char_indices()
        .filter(|(_, ch)| *ch == '{')
        .filter_map(move |(start, _)| balanced_object(text, start))
}

fn balanced_object(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn decimal_field(obj: &Value, key: &str) -> Result<Option<Decimal>, AgentError> {
    let parsed = match obj.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        Some(Value::String(s)) => Decimal::from_str(s.trim()).ok(),
        Some(_) => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| AgentError::Parse(format!("'{key}' is not a number")))
}

fn text_field<'a>(obj: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .trim()
}

/// Parse the advisor's final answer into a decision at `price`.
///
/// The amount is read from `amount` (asset units) first, then from
/// `buy_cost` (quote currency, divided by `price`) for buys or
/// `sell_amount` for sells. Missing or negative amounts on a buy/sell and
/// unknown actions are errors.
pub fn parse_decision(text: &str, price: Decimal) -> Result<Decision, AgentError> {
    let obj = extract_json(text)?;
    let action = obj
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::Parse("decision has no 'action'".to_string()))?
        .trim()
        .to_ascii_lowercase();
    let rationale = text_field(&obj, &["rationale", "reason"]);
    let summary = text_field(&obj, &["summary"]);

    let amount = match action.as_str() {
        "hold" => Decimal::ZERO,
        "buy" => match decimal_field(&obj, "amount")? {
            Some(amount) => amount,
            None => {
                let cost = decimal_field(&obj, "buy_cost")?
                    .ok_or_else(|| AgentError::Parse("buy without 'amount' or 'buy_cost'".to_string()))?;
                if price <= Decimal::ZERO {
                    return Err(AgentError::Parse(format!("cannot convert buy_cost at price {price}")));
                }
                cost.checked_div(price).ok_or_else(|| {
                    AgentError::Parse(format!("buy_cost {cost} at price {price} is out of range"))
                })?
            }
        },
        "sell" => match decimal_field(&obj, "amount")? {
            Some(amount) => amount,
            None => decimal_field(&obj, "sell_amount")?
                .ok_or_else(|| AgentError::Parse("sell without 'amount' or 'sell_amount'".to_string()))?,
        },
        other => return Err(AgentError::Parse(format!("unknown action '{other}'"))),
    };

    if amount < Decimal::ZERO {
        return Err(AgentError::Parse(format!("negative {action} amount {amount}")));
    }

    let decision = match action.as_str() {
        "buy" => Decision::buy(amount, rationale),
        "sell" => Decision::sell(amount, rationale),
        _ => Decision::hold(rationale),
    };
    Ok(decision.with_summary(summary))
}
