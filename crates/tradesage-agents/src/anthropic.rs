use serde_json::{json, Value};
use tradesage_models::config::ModelParams;
use tradesage_models::conversation::{Conversation, Role, Turn};
use tradesage_models::tool::{ToolCallRequest, ToolSchema};

use crate::error::AgentError;
use crate::provider::{AssistantReply, AuthStyle, ProviderFormat, ProviderRequest};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic messages format.
#[derive(Debug, Clone)]
pub struct Anthropic {
    pub default_max_tokens: u32,
}

impl Default for Anthropic {
    fn default() -> Self {
        Self {
            default_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

fn assistant_blocks(turn: &Turn) -> Vec<Value> {
    let mut blocks = Vec::new();
    if !turn.content.is_empty() {
        blocks.push(json!({"type": "text", "text": turn.content}));
    }
    for call in &turn.tool_calls {
        let input = match &call.arguments {
            Value::Object(_) => call.arguments.clone(),
            _ => json!({}),
        };
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": input,
        }));
    }
    blocks
}

/// System turns are hoisted; consecutive tool turns are merged into a single
/// user message of `tool_result` blocks.
fn encode_messages(conversation: &Conversation) -> (Option<String>, Vec<Value>) {
    let mut system: Vec<&str> = Vec::new();
    let mut messages: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    for turn in conversation.turns() {
        if turn.role != Role::Tool && !pending_results.is_empty() {
            messages.push(json!({"role": "user", "content": std::mem::take(&mut pending_results)}));
        }
        match turn.role {
            Role::System => system.push(&turn.content),
            Role::User => messages.push(json!({"role": "user", "content": turn.content})),
            Role::Assistant => {
                messages.push(json!({"role": "assistant", "content": assistant_blocks(turn)}))
            }
            Role::Tool => pending_results.push(json!({
                "type": "tool_result",
                "tool_use_id": turn.tool_call_id.clone().unwrap_or_default(),
                "content": turn.content,
            })),
        }
    }
    if !pending_results.is_empty() {
        messages.push(json!({"role": "user", "content": pending_results}));
    }

    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, messages)
}

impl ProviderFormat for Anthropic {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn build(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        params: &ModelParams,
    ) -> ProviderRequest {
        let (system, messages) = encode_messages(conversation);
        let mut body = json!({
            "model": params.model,
            "max_tokens": params.max_tokens.unwrap_or(self.default_max_tokens),
            "temperature": params.temperature,
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if !tools.is_empty() {
            let tools: Vec<Value> = tools
                .iter()
                .map(|t| json!({"name": t.name, "description": t.description, "input_schema": t.parameters}))
                .collect();
            body["tools"] = Value::Array(tools);
        }

        ProviderRequest {
            path: "/v1/messages".to_string(),
            auth: AuthStyle::Header("x-api-key"),
            headers: vec![("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string())],
            body,
        }
    }

    fn parse(&self, body: &str) -> Result<AssistantReply, AgentError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| AgentError::Parse(format!("messages response is not JSON: {e}")))?;
        let blocks = value
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| AgentError::Parse("messages response has no content array".to_string()))?;

        let mut text = Vec::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(Value::as_str) {
                        text.push(t);
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                    let name = block
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| AgentError::Parse("tool_use block has no name".to_string()))?;
                    tool_calls.push(ToolCallRequest {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments: block.get("input").cloned().unwrap_or_else(|| json!({})),
                    });
                }
                _ => {}
            }
        }

        Ok(AssistantReply {
            content: text.join("\n").trim().to_string(),
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_hoists_system_and_sets_headers() {
        let convo = Conversation::prompt("you are a trader", "advise");
        let req = Anthropic::default().build(&convo, &[], &ModelParams::new("claude-3-5-haiku-latest", 0.2));

        assert_eq!(req.path, "/v1/messages");
        assert_eq!(req.auth, AuthStyle::Header("x-api-key"));
        assert_eq!(req.headers[0].0, "anthropic-version");
        assert_eq!(req.body["system"], "you are a trader");
        assert_eq!(req.body["max_tokens"], 4096);
        assert_eq!(req.body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(req.body["messages"][0]["role"], "user");
    }

    #[test]
    fn build_merges_tool_results() {
        let calls = vec![
            ToolCallRequest {
                id: "tu_1".to_string(),
                name: "price_history".to_string(),
                arguments: json!({"days": 2}),
            },
            ToolCallRequest {
                id: "tu_2".to_string(),
                name: "indicator".to_string(),
                arguments: json!({"name": "rsi"}),
            },
        ];
        let convo = Conversation::prompt("sys", "go")
            .with(Turn::assistant_with_calls("checking", calls))
            .with(Turn::tool("tu_1", "[1,2]"))
            .with(Turn::tool("tu_2", "55.0"));
        let req = Anthropic::default().build(&convo, &[], &ModelParams::new("m", 0.0));

        let msgs = req.body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1]["content"][0]["type"], "text");
        assert_eq!(msgs[1]["content"][1]["type"], "tool_use");
        assert_eq!(msgs[2]["role"], "user");
        assert_eq!(msgs[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(msgs[2]["content"][1]["tool_use_id"], "tu_2");
    }

    #[test]
    fn parse_text_and_tool_use() {
        let body = r#"{"content":[
            {"type":"text","text":"Let me look."},
            {"type":"tool_use","id":"tu_1","name":"price_history","input":{"days":5}}
        ],"stop_reason":"tool_use"}"#;
        let reply = Anthropic::default().parse(body).unwrap();
        assert_eq!(reply.content, "Let me look.");
        assert_eq!(reply.tool_calls[0].name, "price_history");
        assert_eq!(reply.tool_calls[0].arguments, json!({"days": 5}));
    }

    #[test]
    fn parse_rejects_unexpected_shape() {
        assert!(Anthropic::default().parse(r#"{"type":"error"}"#).is_err());
    }
}
