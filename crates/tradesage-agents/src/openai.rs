use serde_json::{json, Map, Value};
use tradesage_models::config::ModelParams;
use tradesage_models::conversation::{Conversation, Role, Turn};
use tradesage_models::tool::{ToolCallRequest, ToolSchema};

use crate::error::AgentError;
use crate::provider::{parse_arguments, AssistantReply, AuthStyle, ProviderFormat, ProviderRequest};

/// OpenAI chat-completions format, spoken by most hosted and relay providers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiCompatible;

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn encode_turn(turn: &Turn) -> Value {
    let mut msg = Map::new();
    msg.insert("role".to_string(), json!(role_name(turn.role)));
    msg.insert("content".to_string(), json!(turn.content));
    if let Some(id) = &turn.tool_call_id {
        msg.insert("tool_call_id".to_string(), json!(id));
    }
    if !turn.tool_calls.is_empty() {
        let calls: Vec<Value> = turn.tool_calls.iter().map(encode_call).collect();
        msg.insert("tool_calls".to_string(), Value::Array(calls));
    }
    Value::Object(msg)
}

fn encode_call(call: &ToolCallRequest) -> Value {
    let arguments = match &call.arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    json!({
        "id": call.id,
        "type": "function",
        "function": { "name": call.name, "arguments": arguments },
    })
}

fn encode_tool(tool: &ToolSchema) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

impl ProviderFormat for OpenAiCompatible {
    fn name(&self) -> &'static str {
        "openai_compatible"
    }

    fn build(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        params: &ModelParams,
    ) -> ProviderRequest {
        let messages: Vec<Value> = conversation.turns().iter().map(encode_turn).collect();
        let mut body = json!({
            "model": params.model,
            "messages": messages,
            "stream": false,
            "temperature": params.temperature,
        });
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(encode_tool).collect());
            body["tool_choice"] = json!("auto");
        }

        ProviderRequest {
            path: "/v1/chat/completions".to_string(),
            auth: AuthStyle::Bearer,
            headers: Vec::new(),
            body,
        }
    }

    fn parse(&self, body: &str) -> Result<AssistantReply, AgentError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| AgentError::Parse(format!("chat completion is not JSON: {e}")))?;
        let message = value
            .pointer("/choices/0/message")
            .ok_or_else(|| AgentError::Parse("chat completion has no choices[0].message".to_string()))?;

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        let reasoning = message
            .get("reasoning_content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
            for (i, call) in calls.iter().enumerate() {
                let name = call
                    .pointer("/function/name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AgentError::Parse(format!("tool_calls[{i}] has no function name")))?;
                let id = call
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("call_{i}"));
                let arguments = match call.pointer("/function/arguments") {
                    Some(Value::String(raw)) => parse_arguments(raw),
                    Some(other) => other.clone(),
                    None => json!({}),
                };
                tool_calls.push(ToolCallRequest {
                    id,
                    name: name.to_string(),
                    arguments,
                });
            }
        }

        let content = if content.is_empty() && tool_calls.is_empty() {
            reasoning.to_string()
        } else {
            content
        };

        Ok(AssistantReply {
            content,
            tool_calls,
        })
    }
}
