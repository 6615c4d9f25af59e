use std::sync::Arc;

use tradesage_models::config::{ModelParams, ProviderKind};
use tradesage_models::conversation::{Conversation, Turn};
use tradesage_models::tool::{ToolCallRequest, ToolSchema};

use crate::anthropic::Anthropic;
use crate::error::AgentError;
use crate::openai::OpenAiCompatible;

/// How the shared credential is attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// The key as the value of a named header.
    Header(&'static str),
}

/// A fully built provider payload, independent of which endpoint serves it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    /// Path appended to the endpoint base URL.
    pub path: String,
    pub auth: AuthStyle,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

/// What the model said in one round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: String::new(),
            tool_calls: calls,
        }
    }

    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }

    pub fn to_turn(&self) -> Turn {
        if self.tool_calls.is_empty() {
            Turn::assistant(self.content.clone())
        } else {
            Turn::assistant_with_calls(self.content.clone(), self.tool_calls.clone())
        }
    }
}

/// Request builder and response parser for one provider family. The gateway
/// only ever sees the `ProviderRequest` this produces, so adding a provider
/// never touches retry or failover.
pub trait ProviderFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pure: shapes the payload, performs no I/O.
    fn build(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        params: &ModelParams,
    ) -> ProviderRequest;

    fn parse(&self, body: &str) -> Result<AssistantReply, AgentError>;
}

pub fn format_for(kind: ProviderKind) -> Arc<dyn ProviderFormat> {
    match kind {
        ProviderKind::OpenaiCompatible => Arc::new(OpenAiCompatible),
        ProviderKind::Anthropic => Arc::new(Anthropic::default()),
    }
}

/// Arguments as the model emitted them: parsed JSON when possible, the raw
/// string otherwise so argument validation can report it.
pub(crate) fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
