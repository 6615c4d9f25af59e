use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::advice_request::LlmSetting;

/// Top-level configuration for TradeSage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TradeSageConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

/// Which request/response format the provider endpoints speak.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenaiCompatible,
    Anthropic,
}

/// Configuration for the endpoint-resilient gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub provider: ProviderKind,
    pub primary_endpoint: String,
    pub backup_endpoint: String,
    /// Name of the environment variable holding the shared API key.
    pub api_key_env: String,
    /// Timeout for a single HTTP attempt.
    pub request_timeout_seconds: u64,
    /// Attempts against one endpoint before failing over (or giving up).
    pub max_attempts_per_endpoint: u32,
    /// Delay before the first retry; doubled on every further retry.
    pub backoff_base_millis: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenaiCompatible,
            primary_endpoint: "https://api.openai.com".to_string(),
            backup_endpoint: "https://api.openai.com".to_string(),
            api_key_env: "TRADESAGE_API_KEY".to_string(),
            request_timeout_seconds: 60,
            max_attempts_per_endpoint: 3,
            backoff_base_millis: 500,
        }
    }
}

/// Model name and sampling parameters for one pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelParams {
    pub fn new(model: impl Into<String>, temperature: f64) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_tokens: None,
        }
    }
}

impl From<&LlmSetting> for ModelParams {
    fn from(setting: &LlmSetting) -> Self {
        Self::new(setting.model.clone(), setting.temperature)
    }
}

/// Configuration for the summarizer/advisor passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    pub summarizer: ModelParams,
    pub advisor: ModelParams,
    /// Model calls allowed in one tool conversation.
    pub max_tool_rounds: u32,
    pub tool_timeout_seconds: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            summarizer: ModelParams::new("gpt-4o-mini", 0.2),
            advisor: ModelParams::new("gpt-4o", 0.2),
            max_tool_rounds: 5,
            tool_timeout_seconds: 30,
        }
    }
}

/// What to do when a day's advisory round fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the day as hold and move on, however many days fail.
    #[default]
    Continue,
    /// Abort the run once this many consecutive days have failed.
    AbortAfter { consecutive: u32 },
}

/// Configuration for backtest runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_cash: Decimal,
    /// Daily bars shown to the advisor, ending at the simulated day.
    pub price_window_days: u32,
    /// Prior trades shown to the advisor.
    pub history_limit: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_cash: Decimal::from(10_000),
            price_window_days: 30,
            history_limit: 10,
            failure_policy: FailurePolicy::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn roundtrip_config() {
        let config = TradeSageConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: TradeSageConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[gateway]
provider = "anthropic"
primary_endpoint = "https://primary.example"
backup_endpoint = "https://backup.example"
max_attempts_per_endpoint = 2

[agents]
max_tool_rounds = 4

[agents.summarizer]
model = "claude-3-5-haiku-latest"
temperature = 0.1

[agents.advisor]
model = "claude-sonnet-4-5"
temperature = 0.3
max_tokens = 2048

[backtest]
initial_cash = "1000"
failure_policy = { mode = "abort_after", consecutive = 2 }
"#;

        let config: TradeSageConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gateway.provider, ProviderKind::Anthropic);
        assert_eq!(config.gateway.max_attempts_per_endpoint, 2);
        assert_eq!(config.gateway.request_timeout_seconds, 60);
        assert_eq!(config.agents.max_tool_rounds, 4);
        assert_eq!(config.agents.advisor.max_tokens, Some(2048));
        assert_eq!(config.backtest.initial_cash, dec!(1000));
        assert_eq!(config.backtest.price_window_days, 30);
        assert_eq!(
            config.backtest.failure_policy,
            FailurePolicy::AbortAfter { consecutive: 2 }
        );
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: TradeSageConfig = toml::from_str("").unwrap();
        assert_eq!(config, TradeSageConfig::default());
        assert_eq!(config.backtest.failure_policy, FailurePolicy::Continue);
    }
}
