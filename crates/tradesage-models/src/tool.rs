use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Schema a tool is advertised to the model with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON-schema object describing the arguments.
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Arguments as emitted by the model. A string value means the model
    /// produced arguments that were not valid JSON.
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "content", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(String),
    Error(String),
}

/// Result of one tool call, folded back into the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success(_))
    }

    /// Text handed back to the model as the tool turn's content.
    pub fn content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success(body) => body.clone(),
            ToolOutcome::Error(message) => format!("Error: {message}"),
        }
    }
}

/// Which registered tools a conversation may use.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ToolSelection {
    #[default]
    None,
    All,
    Only(Vec<String>),
}

impl ToolSelection {
    pub fn allows(&self, name: &str) -> bool {
        match self {
            ToolSelection::None => false,
            ToolSelection::All => true,
            ToolSelection::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Per-invocation facts a tool may depend on. Tools are shared across runs,
/// so anything run-specific travels here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolContext {
    pub symbol: String,
    /// Last date whose data the tool may reveal.
    pub as_of: NaiveDate,
}
