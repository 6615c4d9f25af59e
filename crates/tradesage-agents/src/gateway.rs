use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};
use tradesage_models::config::GatewayConfig;

use crate::error::AgentError;
use crate::provider::{AuthStyle, ProviderRequest};
use crate::transport::Transport;

const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Primary,
    Backup,
}

/// Primary and backup base URLs plus the credential both accept.
/// Immutable for the lifetime of a gateway.
#[derive(Clone)]
pub struct EndpointSet {
    pub primary: String,
    pub backup: String,
    api_key: String,
}

impl EndpointSet {
    pub fn new(primary: impl Into<String>, backup: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            backup: backup.into(),
            api_key: api_key.into(),
        }
    }

    pub fn url(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Primary => &self.primary,
            Endpoint::Backup => &self.backup,
        }
    }
}

impl std::fmt::Debug for EndpointSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSet")
            .field("primary", &self.primary)
            .field("backup", &self.backup)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per endpoint, including the first one. At least 1.
    pub max_attempts_per_endpoint: u32,
    pub backoff_base: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_endpoint: 3,
            backoff_base: Duration::from_millis(500),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            max_attempts_per_endpoint: config.max_attempts_per_endpoint.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_millis),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        }
    }

    /// Attempts a call may make before giving up: both endpoints exhausted.
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts_per_endpoint.max(1) * 2
    }

    /// Exponential delay before entering `state`; none before a first try.
    pub fn delay_before(&self, state: FailoverState) -> Duration {
        match state {
            FailoverState::RetryPrimary { attempt } | FailoverState::RetryBackup { attempt } => {
                let exponent = attempt.saturating_sub(2).min(16);
                self.backoff_base.saturating_mul(1u32 << exponent)
            }
            _ => Duration::ZERO,
        }
    }
}

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, connection error, rate limit, 5xx.
    Transient,
    /// Auth failure, malformed request.
    Fatal,
}

/// Classify a non-success HTTP status.
pub fn classify_status(status: u16) -> FailureKind {
    if status == 429 || status >= 500 {
        FailureKind::Transient
    } else {
        FailureKind::Fatal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    TryPrimary,
    RetryPrimary { attempt: u32 },
    TryBackup,
    RetryBackup { attempt: u32 },
    /// Both endpoints exhausted.
    Failed,
    /// A fatal error; nothing further is attempted.
    Rejected,
}

impl FailoverState {
    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            FailoverState::TryPrimary | FailoverState::RetryPrimary { .. } => Some(Endpoint::Primary),
            FailoverState::TryBackup | FailoverState::RetryBackup { .. } => Some(Endpoint::Backup),
            FailoverState::Failed | FailoverState::Rejected => None,
        }
    }

    /// 1-based attempt number against the current endpoint.
    pub fn attempt(&self) -> u32 {
        match self {
            FailoverState::RetryPrimary { attempt } | FailoverState::RetryBackup { attempt } => *attempt,
            _ => 1,
        }
    }
}

/// Where to go after an attempt in `state` failed with `kind`.
pub fn next_state(state: FailoverState, kind: FailureKind, max_attempts: u32) -> FailoverState {
    let max_attempts = max_attempts.max(1);
    if kind == FailureKind::Fatal {
        return match state {
            FailoverState::Failed => FailoverState::Failed,
            _ => FailoverState::Rejected,
        };
    }
    let attempt = state.attempt();
    match state {
        FailoverState::TryPrimary | FailoverState::RetryPrimary { .. } => {
            if attempt < max_attempts {
                FailoverState::RetryPrimary { attempt: attempt + 1 }
            } else {
                FailoverState::TryBackup
            }
        }
        FailoverState::TryBackup | FailoverState::RetryBackup { .. } => {
            if attempt < max_attempts {
                FailoverState::RetryBackup { attempt: attempt + 1 }
            } else {
                FailoverState::Failed
            }
        }
        terminal => terminal,
    }
}

/// A successful provider answer and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub body: String,
    pub endpoint: String,
    /// Attempts made across both endpoints, including the successful one.
    pub attempts: u32,
    pub failed_over: bool,
}

/// Sends built provider requests with retry and primary→backup failover.
/// Holds no per-call state, so one instance serves concurrent runs.
pub struct Gateway {
    transport: Arc<dyn Transport>,
    endpoints: EndpointSet,
    policy: RetryPolicy,
}

impl Gateway {
    pub fn new(transport: Arc<dyn Transport>, endpoints: EndpointSet, policy: RetryPolicy) -> Self {
        Self {
            transport,
            endpoints,
            policy,
        }
    }

    pub fn from_config(config: &GatewayConfig, api_key: String, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            transport,
            EndpointSet::new(&config.primary_endpoint, &config.backup_endpoint, api_key),
            RetryPolicy::from_config(config),
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn headers_for(&self, request: &ProviderRequest) -> Vec<(String, String)> {
        let mut headers = request.headers.clone();
        match request.auth {
            AuthStyle::Bearer => headers.push((
                "Authorization".to_string(),
                format!("Bearer {}", self.endpoints.api_key),
            )),
            AuthStyle::Header(name) => headers.push((name.to_string(), self.endpoints.api_key.clone())),
        }
        headers
    }

    pub async fn send(&self, request: &ProviderRequest) -> Result<GatewayResponse, AgentError> {
        let start = Instant::now();
        let headers = self.headers_for(request);
        let max_attempts = self.policy.max_attempts_per_endpoint;

        let mut state = FailoverState::TryPrimary;
        let mut attempts = 0u32;
        let mut last_error = String::new();
        let mut last_endpoint = self.endpoints.primary.clone();

        while let Some(endpoint) = state.endpoint() {
            let delay = self.policy.delay_before(state);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let base = self.endpoints.url(endpoint);
            let url = format!("{}{}", base.trim_end_matches('/'), request.path);
            last_endpoint = base.to_string();
            attempts += 1;
            debug!(url = %url, ?endpoint, attempt = state.attempt(), "Sending provider request");

            let (kind, status) = match self
                .transport
                .post(&url, &headers, &request.body, self.policy.request_timeout)
                .await
            {
                Ok(reply) if (200..300).contains(&reply.status) => {
                    debug!(
                        url = %url,
                        attempts,
                        elapsed_ms = start.elapsed().as_millis(),
                        "Provider request succeeded"
                    );
                    return Ok(GatewayResponse {
                        body: reply.body,
                        endpoint: base.to_string(),
                        attempts,
                        failed_over: endpoint == Endpoint::Backup,
                    });
                }
                Ok(reply) => {
                    last_error = format!("HTTP {}: {}", reply.status, truncate(&reply.body));
                    (classify_status(reply.status), Some(reply.status))
                }
                Err(e) => {
                    last_error = e.to_string();
                    (FailureKind::Transient, None)
                }
            };

            let next = next_state(state, kind, max_attempts);
            match next {
                FailoverState::Rejected => {
                    warn!(url = %url, status = ?status, error = %last_error, "Provider rejected request");
                    return Err(AgentError::ProviderRejected {
                        endpoint: base.to_string(),
                        status,
                        message: last_error,
                    });
                }
                FailoverState::TryBackup => {
                    warn!(
                        primary = %self.endpoints.primary,
                        backup = %self.endpoints.backup,
                        error = %last_error,
                        "Primary endpoint exhausted, failing over"
                    );
                }
                _ => {
                    warn!(url = %url, attempt = state.attempt(), error = %last_error, "Transient provider failure");
                }
            }
            state = next;
        }

        error!(
            attempts,
            endpoint = %last_endpoint,
            error = %last_error,
            "All provider endpoints exhausted"
        );
        Err(AgentError::ProviderUnavailable {
            endpoint: last_endpoint,
            attempts,
            last_error,
        })
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= ERROR_BODY_LIMIT {
        return body.to_string();
    }
    let mut s: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    s.push('…');
    s
}
