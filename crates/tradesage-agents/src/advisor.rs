use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use tradesage_models::advice_request::RiskPreference;
use tradesage_models::config::ModelParams;
use tradesage_models::conversation::Conversation;
use tradesage_models::decision::{Decision, TradeLogEntry};
use tradesage_models::ledger::LedgerState;
use tradesage_models::market::{Market, NewsItem, PriceBar};
use tradesage_models::record::DayAnomaly;
use tradesage_models::tool::{ToolContext, ToolSelection};

use crate::agent::ToolAgent;
use crate::error::AgentError;
use crate::parser::parse_decision;
use crate::prompts::{advisor_system_prompt, summarizer_system_prompt, NO_NEWS_DIGEST};

/// Render news as markdown, one section per platform, oldest first.
pub fn render_news(news: &[NewsItem]) -> String {
    let mut by_platform: BTreeMap<&str, Vec<&NewsItem>> = BTreeMap::new();
    for item in news {
        by_platform.entry(item.platform.as_str()).or_default().push(item);
    }

    let mut out = String::new();
    for (platform, mut items) in by_platform {
        items.sort_by_key(|i| i.published_at);
        let _ = writeln!(out, "## {platform}\n");
        for item in items {
            let _ = write!(out, "- [{}] {}", item.published_at.format("%Y-%m-%d %H:%M"), item.title);
            if let Some(url) = &item.url {
                let _ = write!(out, " ({url})");
            }
            out.push('\n');
            if !item.description.trim().is_empty() {
                let _ = writeln!(out, "  {}", item.description.trim());
            }
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Condenses a day's news into a digest with one tool-less conversation.
pub struct NewsSummarizer {
    agent: Arc<ToolAgent>,
    max_rounds: u32,
}

impl NewsSummarizer {
    pub fn new(agent: Arc<ToolAgent>, max_rounds: u32) -> Self {
        Self { agent, max_rounds }
    }

    pub async fn summarize(
        &self,
        market: Market,
        symbol: &str,
        date: NaiveDate,
        news: &[NewsItem],
        params: &ModelParams,
    ) -> Result<String, AgentError> {
        if news.is_empty() {
            debug!(symbol, %date, "No news, skipping summarizer");
            return Ok(NO_NEWS_DIGEST.to_string());
        }

        let conversation = Conversation::prompt(
            summarizer_system_prompt(market, symbol),
            format!("News for {symbol} on {date}:\n\n{}", render_news(news)),
        );
        let ctx = ToolContext {
            symbol: symbol.to_string(),
            as_of: date,
        };
        let outcome = self
            .agent
            .run_conversation(&conversation, &ToolSelection::None, params, self.max_rounds, &ctx)
            .await?;
        info!(symbol, %date, items = news.len(), "News summarized");
        Ok(outcome.final_message)
    }
}

/// A named indicator value shown to the advisor. `None` when there is not
/// enough history yet.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorReading {
    pub name: String,
    pub value: Option<f64>,
}

impl IndicatorReading {
    pub fn new(name: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Everything the advisor sees for one day.
#[derive(Debug, Clone)]
pub struct AdvisoryInput {
    pub symbol: String,
    pub market: Market,
    pub date: NaiveDate,
    /// Bars up to and including `date`, oldest first.
    pub bars: Vec<PriceBar>,
    pub indicators: Vec<IndicatorReading>,
    pub digest: String,
    pub ledger: LedgerState,
    /// Most recent trades, oldest first.
    pub history: Vec<TradeLogEntry>,
    pub risk: RiskPreference,
    pub strategy: String,
}

impl AdvisoryInput {
    /// The day's close, where the decision fills.
    pub fn price(&self) -> Decimal {
        self.bars.last().map(|b| b.close).unwrap_or(Decimal::ZERO)
    }

    pub fn render(&self) -> String {
        let price = self.price();
        let mut out = String::new();
        let _ = writeln!(out, "# {} on {}\n", self.symbol, self.date);

        let _ = writeln!(out, "## Price window (daily)\n");
        let _ = writeln!(out, "| date | open | high | low | close | volume |");
        let _ = writeln!(out, "|---|---|---|---|---|---|");
        for bar in &self.bars {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
            );
        }

        let _ = writeln!(out, "\n## Indicators\n");
        for reading in &self.indicators {
            match reading.value {
                Some(v) => {
                    let _ = writeln!(out, "- {}: {v:.4}", reading.name);
                }
                None => {
                    let _ = writeln!(out, "- {}: n/a", reading.name);
                }
            }
        }

        let _ = writeln!(out, "\n## News digest\n\n{}", self.digest.trim());

        let _ = writeln!(out, "\n## Account\n");
        let _ = writeln!(out, "- Cash: {}", self.ledger.cash);
        let _ = writeln!(out, "- Holding: {} units", self.ledger.holding_amount);
        let _ = writeln!(out, "- Average cost: {}", self.ledger.cost_basis);
        let _ = writeln!(out, "- Position ratio: {}", self.ledger.position_ratio(price));
        let _ = writeln!(out, "- Equity at close {price}: {}", self.ledger.equity(price));

        let _ = writeln!(out, "\n## Recent trades\n");
        if self.history.is_empty() {
            let _ = writeln!(out, "None.");
        }
        for entry in &self.history {
            let _ = writeln!(
                out,
                "- {} {} {} units at {} (value {}, position ratio {}): {}",
                entry.date, entry.action, entry.amount, entry.price, entry.cost, entry.position_ratio, entry.summary
            );
        }
        out
    }
}

/// The advisor's decision for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct Advice {
    pub decision: Decision,
    /// Set when the final answer could not be parsed and `hold` was used.
    pub anomaly: Option<DayAnomaly>,
    pub rounds: u32,
    pub tool_calls: usize,
}

/// Turns an `AdvisoryInput` into a decision through a tool-enabled
/// conversation.
pub struct TradeAdvisor {
    agent: Arc<ToolAgent>,
    selection: ToolSelection,
    max_rounds: u32,
}

impl TradeAdvisor {
    pub fn new(agent: Arc<ToolAgent>, max_rounds: u32) -> Self {
        let selection = if agent.registry().is_empty() {
            ToolSelection::None
        } else {
            ToolSelection::All
        };
        Self {
            agent,
            selection,
            max_rounds,
        }
    }

    pub fn with_selection(mut self, selection: ToolSelection) -> Self {
        self.selection = selection;
        self
    }

    pub async fn advise(&self, input: &AdvisoryInput, params: &ModelParams) -> Result<Advice, AgentError> {
        let conversation = Conversation::prompt(
            advisor_system_prompt(input.market, input.risk, &input.strategy),
            input.render(),
        );
        let ctx = ToolContext {
            symbol: input.symbol.clone(),
            as_of: input.date,
        };
        let outcome = self
            .agent
            .run_conversation(&conversation, &self.selection, params, self.max_rounds, &ctx)
            .await?;

        let (decision, anomaly) = match parse_decision(&outcome.final_message, input.price()) {
            Ok(decision) => (decision, None),
            Err(e) => {
                warn!(symbol = %input.symbol, date = %input.date, error = %e, "Unparsable advice, holding");
                (
                    Decision::hold("advisor answer could not be parsed"),
                    Some(DayAnomaly::Unparsable(e.to_string())),
                )
            }
        };
        info!(
            symbol = %input.symbol,
            date = %input.date,
            action = %decision.action,
            amount = %decision.amount,
            rounds = outcome.rounds,
            "Advice ready"
        );
        Ok(Advice {
            decision,
            anomaly,
            rounds: outcome.rounds,
            tool_calls: outcome.tool_results.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::AssistantReply;
    use crate::test_support::{ScriptedChatModel, EchoTool};
    use crate::tools::ToolRegistry;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tradesage_models::decision::TradeAction;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn news(platform: &str, title: &str, hour: u32) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            description: String::new(),
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            url: None,
            platform: platform.to_string(),
        }
    }

    fn agent(model: Arc<ScriptedChatModel>, registry: ToolRegistry) -> Arc<ToolAgent> {
        Arc::new(ToolAgent::new(model, Arc::new(registry), Duration::from_secs(1)))
    }

    fn input() -> AdvisoryInput {
        AdvisoryInput {
            symbol: "BTC/USDT".to_string(),
            market: Market::Crypto,
            date: date(),
            bars: vec![PriceBar::flat(date(), dec!(50000))],
            indicators: vec![
                IndicatorReading::new("SMA5", Some(49500.0)),
                IndicatorReading::new("RSI14", None),
            ],
            digest: "ETF inflows continue.".to_string(),
            ledger: LedgerState::new(dec!(1000), Decimal::ZERO),
            history: vec![],
            risk: RiskPreference::Stable,
            strategy: "long_term".to_string(),
        }
    }

    #[test]
    fn news_grouped_by_platform_in_time_order() {
        let rendered = render_news(&[
            news("odaily", "late", 12),
            news("cointime", "only", 9),
            news("odaily", "early", 8),
        ]);
        let cointime = rendered.find("## cointime").unwrap();
        let odaily = rendered.find("## odaily").unwrap();
        assert!(cointime < odaily);
        assert!(rendered.find("early").unwrap() < rendered.find("late").unwrap());
    }

    #[tokio::test]
    async fn no_news_skips_the_model() {
        let model = Arc::new(ScriptedChatModel::new(vec![]));
        let summarizer = NewsSummarizer::new(agent(model.clone(), ToolRegistry::new()), 2);
        let digest = summarizer
            .summarize(Market::Crypto, "BTC/USDT", date(), &[], &ModelParams::new("m", 0.2))
            .await
            .unwrap();
        assert_eq!(digest, NO_NEWS_DIGEST);
        assert!(model.conversations().is_empty());
    }

    #[tokio::test]
    async fn summarizer_returns_model_digest() {
        let model = Arc::new(ScriptedChatModel::new(vec![AssistantReply::text("- bullish flows")]));
        let summarizer = NewsSummarizer::new(agent(model.clone(), ToolRegistry::new()), 2);
        let digest = summarizer
            .summarize(Market::Crypto, "BTC/USDT", date(), &[news("x", "ETF", 9)], &ModelParams::new("m", 0.2))
            .await
            .unwrap();
        assert_eq!(digest, "- bullish flows");
        let conversations = model.conversations();
        let user = &conversations[0].turns()[1].content;
        assert!(user.contains("ETF"));
    }

    #[test]
    fn rendered_input_has_all_sections() {
        let text = input().render();
        assert!(text.contains("| 2024-05-01 |"));
        assert!(text.contains("SMA5: 49500.0000"));
        assert!(text.contains("RSI14: n/a"));
        assert!(text.contains("ETF inflows"));
        assert!(text.contains("Cash: 1000"));
        assert!(text.contains("None."));
    }

    #[tokio::test]
    async fn advisor_parses_decision() {
        let model = Arc::new(ScriptedChatModel::new(vec![AssistantReply::text(
            r#"```json
{"action":"buy","buy_cost":500,"reason":"momentum","summary":"half in"}
```"#,
        )]));
        let advisor = TradeAdvisor::new(agent(model, ToolRegistry::new()), 3);
        let advice = advisor.advise(&input(), &ModelParams::new("m", 0.2)).await.unwrap();
        assert_eq!(advice.decision.action, TradeAction::Buy);
        assert_eq!(advice.decision.amount, dec!(0.01));
        assert!(advice.anomaly.is_none());
    }

    #[tokio::test]
    async fn unparsable_answer_holds_with_anomaly() {
        let model = Arc::new(ScriptedChatModel::new(vec![AssistantReply::text("I'd wait and see.")]));
        let advisor = TradeAdvisor::new(agent(model, ToolRegistry::new()), 3);
        let advice = advisor.advise(&input(), &ModelParams::new("m", 0.2)).await.unwrap();
        assert_eq!(advice.decision.action, TradeAction::Hold);
        assert!(matches!(advice.anomaly, Some(DayAnomaly::Unparsable(_))));
    }

    #[tokio::test]
    async fn advisor_offers_registered_tools() {
        let model = Arc::new(ScriptedChatModel::new(vec![AssistantReply::text(r#"{"action":"hold"}"#)]));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let advisor = TradeAdvisor::new(agent(model.clone(), registry), 3);
        advisor.advise(&input(), &ModelParams::new("m", 0.2)).await.unwrap();
        assert_eq!(model.seen_tools()[0].len(), 1);
    }
}
