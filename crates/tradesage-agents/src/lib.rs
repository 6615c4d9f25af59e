pub mod advisor;
pub mod agent;
pub mod anthropic;
pub mod client;
pub mod error;
pub mod gateway;
pub mod openai;
pub mod parser;
pub mod prompts;
pub mod provider;
pub mod tools;
pub mod transport;

pub mod test_support;

pub use advisor::{Advice, AdvisoryInput, IndicatorReading, NewsSummarizer, TradeAdvisor};
pub use agent::{ConversationOutcome, ToolAgent};
pub use client::{ChatModel, LlmClient};
pub use error::AgentError;
pub use gateway::{EndpointSet, Gateway, GatewayResponse, RetryPolicy};
pub use provider::{format_for, AssistantReply, ProviderFormat, ProviderRequest};
pub use tools::{Tool, ToolRegistry};
pub use transport::{HttpTransport, Transport};
