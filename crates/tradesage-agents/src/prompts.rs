use tradesage_models::advice_request::RiskPreference;
use tradesage_models::market::Market;

/// Digest used for a day without any news; no model call is made.
pub const NO_NEWS_DIGEST: &str = "No relevant news was published for this day.";

/// Example decision included in the advisor prompt.
fn decision_schema() -> String {
    let example = serde_json::json!({
        "action": "buy | sell | hold",
        "amount": "<asset units to buy or sell; 0 for hold>",
        "buy_cost": "<optional: quote currency to spend instead of amount>",
        "reason": "<why, citing price action, indicators and news>",
        "summary": "<one short sentence for the trade log>"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

/// Expand a well-known strategy key; free text passes through unchanged.
pub fn strategy_description(strategy: &str) -> String {
    match strategy.trim() {
        "long_term" => "long-term investing".to_string(),
        "short_term" => "short-term trading".to_string(),
        "buy_low_sell_high" => "buying low and selling high".to_string(),
        "trend_following" => "trend following".to_string(),
        other => other.to_string(),
    }
}

pub fn summarizer_system_prompt(market: Market, symbol: &str) -> String {
    match market {
        Market::Crypto => format!(
            "You are a senior cryptocurrency news analyst. Summarize the news below, \
             focusing on anything that can move {symbol}:\n\
             - market moves and flows\n\
             - regulation and policy changes\n\
             - geopolitics and macroeconomic data\n\
             - price action of the major coins\n\
             - news and project updates about {symbol} itself\n\n\
             Answer as a concise bullet list. Flag any black-swan event explicitly."
        ),
        Market::Stock => format!(
            "You are a senior equity news analyst. Summarize the news collected from \
             different platforms, focusing on anything that can move the stock {symbol}:\n\
             - market moves and index trends\n\
             - policy and regulation changes\n\
             - geopolitics and macroeconomic data\n\
             - company and sector news about {symbol}\n\n\
             Answer as a concise bullet list. Company news tends to overstate good news; \
             weigh negative items carefully."
        ),
    }
}

pub fn advisor_system_prompt(market: Market, risk: RiskPreference, strategy: &str) -> String {
    let asset = match market {
        Market::Crypto => "cryptocurrency",
        Market::Stock => "stock",
    };
    format!(
        "You are a professional {asset} trading advisor making one decision per trading day.\n\n\
         ## INVESTOR PROFILE\n\n\
         - Risk preference: {risk}\n\
         - Strategy preference: {strategy}\n\n\
         ## INPUT\n\n\
         You receive the recent daily price window, technical indicators (SMA5, SMA20, RSI14), \
         a news digest for the day, the current account (cash and holding) and the most recent \
         executed trades. Tools may be available to fetch more price history or indicators; \
         they only return data up to the current day.\n\n\
         ## RULES\n\n\
         - Decide exactly one of buy, sell or hold.\n\
         - Never spend more cash than available and never sell more than held.\n\
         - Prefer hold when the signals disagree.\n\
         - Trades fill at today's close price.\n\n\
         ## OUTPUT\n\n\
         Respond with ONLY a JSON object of this shape:\n{}",
        decision_schema(),
        risk = risk.describe(),
        strategy = strategy_description(strategy),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_keys_expand() {
        assert_eq!(strategy_description("long_term"), "long-term investing");
        assert_eq!(strategy_description("trend_following"), "trend following");
        assert_eq!(strategy_description("scalp the open"), "scalp the open");
    }

    #[test]
    fn summarizer_prompt_names_symbol() {
        assert!(summarizer_system_prompt(Market::Crypto, "BTC/USDT").contains("BTC/USDT"));
        assert!(summarizer_system_prompt(Market::Stock, "600519").contains("stock 600519"));
    }

    #[test]
    fn advisor_prompt_contains_profile_and_schema() {
        let prompt = advisor_system_prompt(Market::Crypto, RiskPreference::RiskAverse, "short_term");
        assert!(prompt.contains("cryptocurrency"));
        assert!(prompt.contains("risk-averse"));
        assert!(prompt.contains("short-term trading"));
        assert!(prompt.contains("\"action\""));
        assert!(prompt.contains("\"buy_cost\""));
        assert!(prompt.contains("\"summary\""));
    }
}
