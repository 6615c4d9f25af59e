//! Scripted stand-ins for the network and the model.
//!
//! `ScriptedTransport` replays HTTP outcomes per endpoint so gateway retry
//! and failover can be exercised without sockets; `ScriptedChatModel` replays
//! assistant replies and records every conversation it is shown.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tradesage_models::config::ModelParams;
use tradesage_models::conversation::Conversation;
use tradesage_models::tool::{ToolCallRequest, ToolContext, ToolSchema};

use crate::client::ChatModel;
use crate::error::AgentError;
use crate::provider::AssistantReply;
use crate::tools::Tool;
use crate::transport::{HttpReply, Transport, TransportError};

/// One scripted HTTP outcome.
#[derive(Debug, Clone)]
pub enum TransportStep {
    Reply { status: u16, body: String },
    Timeout,
    Connection(String),
}

impl TransportStep {
    pub fn ok(body: &str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        TransportStep::Reply {
            status,
            body: body.to_string(),
        }
    }
}

/// Per-endpoint queues of outcomes. The last step of a queue repeats
/// forever, so a single failing step scripts an endpoint that never
/// recovers. Unscripted endpoints refuse connections.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<TransportStep>>>,
    attempts: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script every URL that starts with `base`.
    pub fn script(&self, base: &str, steps: Vec<TransportStep>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(base.to_string(), steps.into());
        }
    }

    /// `(url, headers)` of every attempt, in order.
    pub fn attempts(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn next_step(&self, url: &str) -> TransportStep {
        let Ok(mut scripts) = self.scripts.lock() else {
            return TransportStep::Connection("script lock poisoned".to_string());
        };
        let Some(queue) = scripts
            .iter_mut()
            .find(|(base, _)| url.starts_with(base.as_str()))
            .map(|(_, q)| q)
        else {
            return TransportStep::Connection(format!("no script for {url}"));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(TransportStep::Timeout)
        } else {
            queue.front().cloned().unwrap_or(TransportStep::Timeout)
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        _body: &Value,
        _timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push((url.to_string(), headers.to_vec()));
        }
        match self.next_step(url) {
            TransportStep::Reply { status, body } => Ok(HttpReply { status, body }),
            TransportStep::Timeout => Err(TransportError::Timeout),
            TransportStep::Connection(e) => Err(TransportError::Connection(e)),
        }
    }
}

/// Replays queued model answers in order. An exhausted script answers
/// with `ProviderUnavailable`.
#[derive(Default)]
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<Result<AssistantReply, AgentError>>>,
    conversations: Mutex<Vec<Conversation>>,
    tools: Mutex<Vec<Vec<ToolSchema>>>,
}

impl ScriptedChatModel {
    pub fn new(replies: Vec<AssistantReply>) -> Self {
        Self::from_results(replies.into_iter().map(Ok).collect())
    }

    pub fn from_results(replies: Vec<Result<AssistantReply, AgentError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn push(&self, reply: Result<AssistantReply, AgentError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Conversations as they were sent, one per model call.
    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Tool schemas offered on each call.
    pub fn seen_tools(&self) -> Vec<Vec<ToolSchema>> {
        self.tools.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

/// The error a scripted model returns for an outage.
pub fn outage() -> AgentError {
    AgentError::ProviderUnavailable {
        endpoint: "https://backup.test".to_string(),
        attempts: 6,
        last_error: "HTTP 503: scripted outage".to_string(),
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        _params: &ModelParams,
    ) -> Result<AssistantReply, AgentError> {
        if let Ok(mut seen) = self.conversations.lock() {
            seen.push(conversation.clone());
        }
        if let Ok(mut seen) = self.tools.lock() {
            seen.push(tools.to_vec());
        }
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        next.unwrap_or_else(|| {
            Err(AgentError::ProviderUnavailable {
                endpoint: "scripted".to_string(),
                attempts: 0,
                last_error: "script exhausted".to_string(),
            })
        })
    }
}

pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

/// Echoes `text` with the invocation context.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<String, String> {
        let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
        Ok(format!("{text} @ {} {}", ctx.symbol, ctx.as_of))
    }
}

pub struct PanicTool;

#[async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        "panic"
    }

    fn description(&self) -> &str {
        "Always panics"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: Value, _ctx: &ToolContext) -> Result<String, String> {
        panic!("tool blew up")
    }
}

/// Sleeps far longer than any test timeout.
pub struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Never finishes in time"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: Value, _ctx: &ToolContext) -> Result<String, String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("late".to_string())
    }
}

/// Sleeps for `delay`, then counts the call as completed.
pub struct CountingTool {
    delay: Duration,
    completed: AtomicUsize,
}

impl CountingTool {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            completed: AtomicUsize::new(0),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        "counting"
    }

    fn description(&self) -> &str {
        "Counts completed calls after a delay"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: Value, _ctx: &ToolContext) -> Result<String, String> {
        tokio::time::sleep(self.delay).await;
        let n = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("completed {n}"))
    }
}
