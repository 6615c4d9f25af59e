//! Advice and backtest entry points wired with scripted models and
//! in-memory collaborators.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tradesage::{advise, backtest, build_services, Services};
use tradesage_agents::test_support::{tool_call, ScriptedChatModel};
use tradesage_agents::AssistantReply;
use tradesage_backtest::test_support::{daily_bars, RecordingExecutor, StaticNews, StaticPriceHistory};
use tradesage_backtest::{NoopObserver, TradeExecutor};
use tradesage_models::advice_request::AdviceRequest;
use tradesage_models::config::{FailurePolicy, TradeSageConfig};
use tradesage_models::conversation::Role;
use tradesage_models::decision::TradeAction;
use tradesage_models::market::{DateRange, Market};

fn may(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
}

fn request_body(market: &str) -> serde_json::Value {
    json!({
        "symbol": "BTC/USDT",
        "market": market,
        "riskPrefer": "risk_averse",
        "strategyPrefer": "long_term",
        "llmSettings": [{"model": "gpt-4o-mini", "temperature": 0.2}],
        "historys": [{
            "timestamp": 1714521600000i64,
            "action": "buy",
            "buyCost": 100.0,
            "positionRatio": 0.1,
            "price": 50000.0,
            "summary": "oversold bounce"
        }],
        "holdAmount": 0.002,
        "remaining": 900,
        "callbackUrl": "http://localhost:5000/ai/simtrade",
        "id": "50738043-a339-4508-bd73-4f3582088f7a"
    })
}

fn services(model: Arc<ScriptedChatModel>, news: StaticNews, executor: Option<Arc<dyn TradeExecutor>>) -> Services {
    let prices = Arc::new(StaticPriceHistory::new(daily_bars(
        may(1),
        &[dec!(60000), dec!(61000), dec!(62000)],
    )));
    build_services(&TradeSageConfig::default(), model, prices, Arc::new(news), executor).unwrap()
}

#[tokio::test]
async fn valid_request_yields_one_decision_and_executes_crypto() {
    let model = Arc::new(ScriptedChatModel::new(vec![
        AssistantReply::text("Miners are accumulating."),
        AssistantReply::text(r#"```json
{"action": "buy", "buy_cost": 310, "reason": "trend intact", "summary": "added"}
```"#),
    ]));
    let executor = Arc::new(RecordingExecutor::new());
    let news = StaticNews::new().with(may(3), "Hashrate hits a new high");
    let services = services(model.clone(), news, Some(executor.clone() as Arc<dyn TradeExecutor>));
    let request = AdviceRequest::from_json(&request_body("crypto")).unwrap();

    let outcome = advise(&services, &request, may(3)).await.unwrap();

    assert_eq!(outcome.id, request.id);
    assert_eq!(outcome.date, may(3));
    assert_eq!(outcome.decision.action, TradeAction::Buy);
    assert_eq!(outcome.decision.amount, dec!(0.005));
    assert_eq!(outcome.price, dec!(62000));
    assert_eq!(outcome.ledger_after.cash, dec!(590));
    assert_eq!(outcome.ledger_after.holding_amount, dec!(0.007));
    assert_eq!(outcome.digest, "Miners are accumulating.");
    assert_eq!(outcome.anomaly, None);

    let executed = executor.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].1.amount, dec!(0.005));
    assert_eq!(outcome.fill.as_ref().map(|f| f.order_id.as_str()), Some("test-1"));

    let advisor_prompt = model.conversations()[1]
        .turns()
        .iter()
        .find(|t| t.role == Role::User)
        .map(|t| t.content.clone())
        .unwrap();
    assert!(advisor_prompt.contains("oversold bounce"));
    assert!(advisor_prompt.contains("Miners are accumulating."));

    let offered = model.seen_tools();
    assert!(offered[0].is_empty());
    let names: Vec<&str> = offered[1].iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["indicator", "price_history"]);
}

#[tokio::test]
async fn stock_decisions_are_not_executed() {
    let model = Arc::new(ScriptedChatModel::new(vec![AssistantReply::text(
        r#"{"action": "sell", "sell_amount": 0.001, "reason": "trim"}"#,
    )]));
    let executor = Arc::new(RecordingExecutor::new());
    let services = services(model, StaticNews::new(), Some(executor.clone() as Arc<dyn TradeExecutor>));
    let request = AdviceRequest::from_json(&request_body("stock")).unwrap();
    assert_eq!(request.market, Market::Stock);

    let outcome = advise(&services, &request, may(3)).await.unwrap();

    assert_eq!(outcome.decision.action, TradeAction::Sell);
    assert_eq!(outcome.ledger_after.holding_amount, dec!(0.001));
    assert!(outcome.fill.is_none());
    assert!(executor.executed().is_empty());
}

#[tokio::test]
async fn price_tool_stops_at_the_advised_day() {
    let model = Arc::new(ScriptedChatModel::new(vec![
        AssistantReply::calls(vec![tool_call("c1", "price_history", json!({"days": 5}))]),
        AssistantReply::text(r#"{"action": "hold", "reason": "flat"}"#),
    ]));
    let services = services(model.clone(), StaticNews::new(), None);
    let request = AdviceRequest::from_json(&request_body("crypto")).unwrap();

    let outcome = advise(&services, &request, may(2)).await.unwrap();
    assert_eq!(outcome.decision.action, TradeAction::Hold);
    assert_eq!(outcome.price, dec!(61000));

    let tool_turn = model.conversations()[1]
        .turns()
        .iter()
        .find(|t| t.role == Role::Tool)
        .map(|t| t.content.clone())
        .unwrap();
    assert!(tool_turn.contains("2024-05-02"));
    assert!(!tool_turn.contains("2024-05-03"));
}

#[tokio::test]
async fn backtest_outcome_serializes_with_report() {
    let hold = || AssistantReply::text(r#"{"action": "hold", "reason": "wait"}"#);
    let model = Arc::new(ScriptedChatModel::new(vec![hold(), hold(), hold()]));
    let services = services(model, StaticNews::new(), None);
    let request = AdviceRequest::from_json(&request_body("crypto")).unwrap();
    let run = services.request_for(&request, DateRange::new(may(1), may(3)));

    let outcome = backtest(&services, &run, &NoopObserver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.trade_log.len(), 1);
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["report"]["status"]["status"], "completed");
    assert_eq!(value["report"]["series"].as_array().unwrap().len(), 3);
    assert_eq!(outcome.report.ai.final_equity, dec!(1024));
}

#[test]
fn sample_config_parses() {
    let config: TradeSageConfig = toml::from_str(include_str!("../../../config/tradesage.toml")).unwrap();
    assert_eq!(config.gateway.max_attempts_per_endpoint, 3);
    assert_eq!(config.agents.advisor.max_tokens, Some(1024));
    assert_eq!(config.backtest.initial_cash, dec!(10000));
    assert_eq!(
        config.backtest.failure_policy,
        FailurePolicy::AbortAfter { consecutive: 3 }
    );
}
