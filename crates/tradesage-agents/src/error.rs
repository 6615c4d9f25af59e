use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// Auth failure or malformed request/response. Never retried.
    #[error("Provider rejected request at {endpoint} (status {status:?}): {message}")]
    ProviderRejected {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// Both endpoints exhausted their retries.
    #[error("Provider unavailable after {attempts} attempts (last endpoint {endpoint}): {last_error}")]
    ProviderUnavailable {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Tool loop exceeded {max_rounds} rounds without a final answer")]
    ToolLoopExceeded { max_rounds: u32 },

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Failures that only cost the current simulated day.
    pub fn is_day_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable { .. } | AgentError::ToolLoopExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(AgentError::ToolLoopExceeded { max_rounds: 5 }.is_day_recoverable());
        assert!(AgentError::ProviderUnavailable {
            endpoint: "https://backup".to_string(),
            attempts: 6,
            last_error: "timeout".to_string(),
        }
        .is_day_recoverable());
        assert!(!AgentError::ProviderRejected {
            endpoint: "https://primary".to_string(),
            status: Some(401),
            message: "bad key".to_string(),
        }
        .is_day_recoverable());
        assert!(!AgentError::Parse("x".to_string()).is_day_recoverable());
    }

    #[test]
    fn unavailable_message_carries_context() {
        let err = AgentError::ProviderUnavailable {
            endpoint: "https://backup".to_string(),
            attempts: 6,
            last_error: "HTTP 503".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("6 attempts"));
        assert!(msg.contains("https://backup"));
    }
}
