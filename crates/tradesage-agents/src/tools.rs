use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use tradesage_models::tool::{
    ToolCallRequest, ToolContext, ToolOutcome, ToolResult, ToolSchema, ToolSelection,
};

use crate::error::AgentError;

/// A named capability the model may call mid-conversation.
///
/// Implementations are shared across runs and must not hold run state;
/// anything run-specific arrives through `ToolContext`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON-schema object for the arguments.
    fn parameters(&self) -> Value;

    /// `Err` carries a message the model gets to see.
    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<String, String>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Name → tool mapping. Built once, then shared read-only.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas of the registered tools the selection allows, sorted by name.
    pub fn schemas(&self, selection: &ToolSelection) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .filter(|t| selection.allows(t.name()))
            .map(|t| t.schema())
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Run one call. Never fails: every problem becomes an error result.
    pub async fn execute(
        &self,
        call: &ToolCallRequest,
        selection: &ToolSelection,
        ctx: &ToolContext,
        timeout: Duration,
    ) -> ToolResult {
        let outcome = self.outcome(call, selection, ctx, timeout).await;
        if let ToolOutcome::Error(message) = &outcome {
            warn!(tool = %call.name, call_id = %call.id, error = %message, "Tool call failed");
        } else {
            debug!(tool = %call.name, call_id = %call.id, "Tool call succeeded");
        }
        ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            outcome,
        }
    }

    async fn outcome(
        &self,
        call: &ToolCallRequest,
        selection: &ToolSelection,
        ctx: &ToolContext,
        timeout: Duration,
    ) -> ToolOutcome {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolOutcome::Error(format!("tool '{}' is not registered", call.name));
        };
        if !selection.allows(&call.name) {
            return ToolOutcome::Error(format!(
                "tool '{}' is not enabled for this conversation",
                call.name
            ));
        }
        if let Err(reason) = validate_arguments(&tool.parameters(), &call.arguments) {
            return ToolOutcome::Error(format!("invalid arguments for '{}': {reason}", call.name));
        }

        let tool = Arc::clone(tool);
        let args = call.arguments.clone();
        let ctx = ctx.clone();
        let mut handle = tokio::spawn(async move { tool.call(args, &ctx).await });

        let joined = tokio::time::timeout(timeout, &mut handle).await;
        if joined.is_err() {
            handle.abort();
        }
        match joined {
            Ok(Ok(Ok(body))) => ToolOutcome::Success(body),
            Ok(Ok(Err(message))) => ToolOutcome::Error(message),
            Ok(Err(join_err)) => ToolOutcome::Error(format!("tool '{}' panicked: {join_err}", call.name)),
            Err(_) => ToolOutcome::Error(format!(
                "tool '{}' timed out after {}ms",
                call.name,
                timeout.as_millis()
            )),
        }
    }
}

/// Check arguments against the subset of JSON schema tools declare:
/// an object, its `required` keys, and primitive property types.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    let obj = match args {
        Value::Object(obj) => obj,
        Value::String(raw) => return Err(format!("arguments are not valid JSON: {raw}")),
        other => return Err(format!("arguments must be an object, got {other}")),
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        let missing: Vec<&str> = required
            .iter()
            .filter_map(Value::as_str)
            .filter(|key| !obj.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required arguments: {}", missing.join(", ")));
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in obj {
            let Some(expected) = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!("argument '{key}' must be of type {expected}"));
            }
            if let Some(allowed) = properties[key].get("enum").and_then(Value::as_array) {
                if !allowed.contains(value) {
                    return Err(format!("argument '{key}' must be one of {}", Value::Array(allowed.clone())));
                }
            }
        }
    }
    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
