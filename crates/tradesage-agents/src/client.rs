use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tradesage_models::config::ModelParams;
use tradesage_models::conversation::Conversation;
use tradesage_models::tool::ToolSchema;

use crate::error::AgentError;
use crate::gateway::Gateway;
use crate::provider::{AssistantReply, ProviderFormat};

/// One model round: conversation in, assistant reply out. Mockable for testing.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        params: &ModelParams,
    ) -> Result<AssistantReply, AgentError>;
}

/// Builds with a provider format, sends through the gateway, parses the reply.
pub struct LlmClient {
    gateway: Arc<Gateway>,
    format: Arc<dyn ProviderFormat>,
}

impl LlmClient {
    pub fn new(gateway: Arc<Gateway>, format: Arc<dyn ProviderFormat>) -> Self {
        Self { gateway, format }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        params: &ModelParams,
    ) -> Result<AssistantReply, AgentError> {
        let request = self.format.build(conversation, tools, params);
        let response = self.gateway.send(&request).await?;

        let reply = self.format.parse(&response.body).map_err(|e| AgentError::ProviderRejected {
            endpoint: response.endpoint.clone(),
            status: None,
            message: format!("unparsable {} response: {e}", self.format.name()),
        })?;

        debug!(
            provider = self.format.name(),
            model = %params.model,
            endpoint = %response.endpoint,
            attempts = response.attempts,
            tool_calls = reply.tool_calls.len(),
            "Model round complete"
        );
        Ok(reply)
    }
}
