use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use tradesage_models::config::ModelParams;
use tradesage_models::conversation::{Conversation, Turn};
use tradesage_models::tool::{ToolContext, ToolResult, ToolSelection};

use crate::client::ChatModel;
use crate::error::AgentError;
use crate::tools::ToolRegistry;

/// How an advisory round ended.
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    pub final_message: String,
    /// Every turn, from the initial context through the final answer.
    pub transcript: Conversation,
    pub tool_results: Vec<ToolResult>,
    /// Model calls made.
    pub rounds: u32,
}

/// Drives the model through tool-call rounds until it gives a final answer.
pub struct ToolAgent {
    model: Arc<dyn ChatModel>,
    registry: Arc<ToolRegistry>,
    tool_timeout: Duration,
}

impl ToolAgent {
    pub fn new(model: Arc<dyn ChatModel>, registry: Arc<ToolRegistry>, tool_timeout: Duration) -> Self {
        Self {
            model,
            registry,
            tool_timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Each model call counts as one round; `max_rounds` is at least 1.
    /// Gateway errors propagate unchanged. Tool failures never do: they are
    /// handed back to the model as error results.
    pub async fn run_conversation(
        &self,
        initial: &Conversation,
        selection: &ToolSelection,
        params: &ModelParams,
        max_rounds: u32,
        ctx: &ToolContext,
    ) -> Result<ConversationOutcome, AgentError> {
        let start = Instant::now();
        let max_rounds = max_rounds.max(1);
        let schemas = self.registry.schemas(selection);
        let mut conversation = initial.clone();
        let mut tool_results = Vec::new();

        for round in 1..=max_rounds {
            let reply = self.model.complete(&conversation, &schemas, params).await?;

            if reply.is_final() {
                if reply.content.trim().is_empty() {
                    warn!(round, model = %params.model, "Empty model reply, asking again");
                    continue;
                }
                conversation = conversation.with(reply.to_turn());
                info!(
                    rounds = round,
                    tool_calls = tool_results.len(),
                    elapsed_ms = start.elapsed().as_millis(),
                    "Conversation finished"
                );
                return Ok(ConversationOutcome {
                    final_message: reply.content,
                    transcript: conversation,
                    tool_results,
                    rounds: round,
                });
            }

            if round == max_rounds {
                debug!(round, calls = reply.tool_calls.len(), "Last round, tool calls not run");
                break;
            }
            debug!(round, calls = reply.tool_calls.len(), "Model requested tools");
            conversation = conversation.with(reply.to_turn());
            for call in &reply.tool_calls {
                let result = self
                    .registry
                    .execute(call, selection, ctx, self.tool_timeout)
                    .await;
                conversation = conversation.with(Turn::tool(result.call_id.clone(), result.content()));
                tool_results.push(result);
            }
        }

        warn!(max_rounds, tool_calls = tool_results.len(), "Tool loop exceeded");
        Err(AgentError::ToolLoopExceeded { max_rounds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::AssistantReply;
    use crate::test_support::{tool_call, CountingTool, EchoTool, ScriptedChatModel};
    use chrono::NaiveDate;
    use serde_json::json;
    use tradesage_models::conversation::Role;

    fn ctx() -> ToolContext {
        ToolContext {
            symbol: "ETH/USDT".to_string(),
            as_of: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    fn agent(model: Arc<ScriptedChatModel>) -> ToolAgent {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        ToolAgent::new(model, Arc::new(registry), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn final_answer_without_tools() {
        let model = Arc::new(ScriptedChatModel::new(vec![AssistantReply::text("hold")]));
        let outcome = agent(model.clone())
            .run_conversation(
                &Conversation::prompt("s", "u"),
                &ToolSelection::None,
                &ModelParams::new("m", 0.0),
                3,
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.final_message, "hold");
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.transcript.len(), 3);
        assert!(model.seen_tools()[0].is_empty());
    }

    #[tokio::test]
    async fn tool_results_are_folded_back() {
        let model = Arc::new(ScriptedChatModel::new(vec![
            AssistantReply::calls(vec![tool_call("c1", "echo", json!({"text": "ping"}))]),
            AssistantReply::text("done"),
        ]));
        let outcome = agent(model.clone())
            .run_conversation(
                &Conversation::prompt("s", "u"),
                &ToolSelection::All,
                &ModelParams::new("m", 0.0),
                3,
                &ctx(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.tool_results.len(), 1);
        let second = &model.conversations()[1];
        let tool_turn = second.last().unwrap();
        assert_eq!(tool_turn.role, Role::Tool);
        assert_eq!(tool_turn.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tool_turn.content, "ping @ ETH/USDT 2024-03-01");
    }

    #[tokio::test]
    async fn empty_reply_uses_a_round() {
        let model = Arc::new(ScriptedChatModel::new(vec![
            AssistantReply::text("  "),
            AssistantReply::text("sell"),
        ]));
        let outcome = agent(model)
            .run_conversation(
                &Conversation::prompt("s", "u"),
                &ToolSelection::None,
                &ModelParams::new("m", 0.0),
                2,
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.final_message, "sell");
        assert_eq!(outcome.rounds, 2);
    }

    #[tokio::test]
    async fn endless_tool_calls_exceed_the_loop() {
        let replies = (0..5)
            .map(|i| AssistantReply::calls(vec![tool_call(&format!("c{i}"), "echo", json!({"text": "x"}))]))
            .collect();
        let model = Arc::new(ScriptedChatModel::new(replies));
        let err = agent(model.clone())
            .run_conversation(
                &Conversation::prompt("s", "u"),
                &ToolSelection::All,
                &ModelParams::new("m", 0.0),
                3,
                &ctx(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolLoopExceeded { max_rounds: 3 }));
        assert_eq!(model.conversations().len(), 3);
    }

    #[tokio::test]
    async fn last_round_tool_calls_are_not_run() {
        let tool = Arc::new(CountingTool::new(Duration::from_millis(1)));
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone()).unwrap();
        let replies = (0..2)
            .map(|i| AssistantReply::calls(vec![tool_call(&format!("c{i}"), "counting", json!({}))]))
            .collect();
        let model = Arc::new(ScriptedChatModel::new(replies));
        let agent = ToolAgent::new(model, Arc::new(registry), Duration::from_secs(1));

        let err = agent
            .run_conversation(
                &Conversation::prompt("s", "u"),
                &ToolSelection::All,
                &ModelParams::new("m", 0.0),
                2,
                &ctx(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolLoopExceeded { max_rounds: 2 }));
        assert_eq!(tool.completed(), 1);
    }

    #[tokio::test]
    async fn initial_conversation_is_untouched() {
        let initial = Conversation::prompt("s", "u");
        let model = Arc::new(ScriptedChatModel::new(vec![AssistantReply::text("ok")]));
        agent(model)
            .run_conversation(&initial, &ToolSelection::None, &ModelParams::new("m", 0.0), 1, &ctx())
            .await
            .unwrap();
        assert_eq!(initial.len(), 2);
    }
}
