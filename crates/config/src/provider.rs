//! Provider instance configuration.

use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use duration_str::deserialize_duration;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{CircuitBreakerConfig, ConfigError, RateLimitPolicy};

/// The upstream vendors the gateway knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI Chat Completions.
    Openai,
    /// Azure-hosted OpenAI deployments.
    AzureOpenai,
    /// Alibaba DashScope (Qianwen).
    Qianwen,
    /// Anthropic Messages API.
    Claude,
    /// Baichuan, OpenAI-compatible.
    Baichuan,
    /// Zhipu ChatGLM, OpenAI-compatible.
    Chatglm,
}

impl ProviderKind {
    /// All recognized kinds, in declaration order.
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::Openai,
        ProviderKind::AzureOpenai,
        ProviderKind::Qianwen,
        ProviderKind::Claude,
        ProviderKind::Baichuan,
        ProviderKind::Chatglm,
    ];

    /// Wire name of the kind, as used in configuration and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::AzureOpenai => "azure_openai",
            ProviderKind::Qianwen => "qianwen",
            ProviderKind::Claude => "claude",
            ProviderKind::Baichuan => "baichuan",
            ProviderKind::Chatglm => "chatglm",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown provider kind '{s}'")))
    }
}

/// Configuration of one named provider instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Which upstream this instance talks to.
    #[serde(rename = "type")]
    pub kind: ProviderKind,

    /// Human readable name, defaults to the instance name.
    #[serde(default)]
    pub display_name: Option<String>,

    /// Credential sent to the upstream.
    pub api_key: SecretString,

    /// Override of the vendor's default endpoint.
    #[serde(default)]
    pub base_url: Option<Url>,

    /// Per-call timeout for synchronous generations and probes.
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,

    /// OpenAI-specific headers.
    #[serde(default)]
    pub openai: Option<OpenAiSettings>,

    /// Azure resource and deployment.
    #[serde(default)]
    pub azure: Option<AzureSettings>,

    /// DashScope workspace.
    #[serde(default)]
    pub qianwen: Option<QianwenSettings>,

    /// Anthropic API version and token defaults.
    #[serde(default)]
    pub claude: Option<ClaudeSettings>,

    /// Admission rate limiting for this instance. No limit when absent.
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,

    /// Breaker parameters for this instance.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-model price overrides, applied on top of the adapter catalog.
    #[serde(default)]
    pub pricing: BTreeMap<String, PricingConfig>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

impl ProviderConfig {
    /// A minimal configuration of the given kind. Kind-specific settings are left empty.
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            display_name: None,
            api_key: SecretString::from(api_key.into()),
            base_url: None,
            timeout: default_timeout(),
            openai: None,
            azure: None,
            qianwen: None,
            claude: None,
            rate_limit: None,
            circuit_breaker: CircuitBreakerConfig::default(),
            pricing: BTreeMap::new(),
        }
    }

    /// Set the base URL override.
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the rate limiting policy.
    pub fn with_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    /// Set the breaker parameters.
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = breaker;
        self
    }

    /// The names of the kind-specific sections that are present.
    fn present_sections(&self) -> Vec<(&'static str, ProviderKind)> {
        let mut sections = Vec::new();

        if self.openai.is_some() {
            sections.push(("openai", ProviderKind::Openai));
        }

        if self.azure.is_some() {
            sections.push(("azure", ProviderKind::AzureOpenai));
        }

        if self.qianwen.is_some() {
            sections.push(("qianwen", ProviderKind::Qianwen));
        }

        if self.claude.is_some() {
            sections.push(("claude", ProviderKind::Claude));
        }

        sections
    }

    /// Check the invariants of the instance configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::MissingCredential);
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be greater than zero".to_string()));
        }

        for (section, kind) in self.present_sections() {
            if kind != self.kind {
                return Err(ConfigError::Invalid(format!(
                    "settings section '{section}' does not match provider type '{}'",
                    self.kind
                )));
            }
        }

        if self.kind == ProviderKind::AzureOpenai {
            let Some(azure) = &self.azure else {
                return Err(ConfigError::Invalid(
                    "azure_openai providers require an [azure] section with a deployment".to_string(),
                ));
            };

            if azure.deployment.trim().is_empty() {
                return Err(ConfigError::Invalid("azure deployment must not be empty".to_string()));
            }

            if azure.resource.as_deref().is_none_or(|r| r.trim().is_empty()) && self.base_url.is_none() {
                return Err(ConfigError::Invalid(
                    "azure_openai providers need either a resource name or a base_url".to_string(),
                ));
            }
        }

        if let Some(claude) = &self.claude
            && claude.default_max_tokens == Some(0)
        {
            return Err(ConfigError::Invalid("default_max_tokens must be at least 1".to_string()));
        }

        if let Some(policy) = &self.rate_limit {
            policy.validate()?;
        }

        self.circuit_breaker.validate()?;

        for (model, price) in &self.pricing {
            if price.input < 0.0 || price.output < 0.0 || !price.input.is_finite() || !price.output.is_finite() {
                return Err(ConfigError::Invalid(format!("pricing for model '{model}' must be non-negative")));
            }
        }

        Ok(())
    }
}

/// Optional OpenAI account headers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiSettings {
    /// Sent as `OpenAI-Organization`.
    #[serde(default)]
    pub organization: Option<String>,
    /// Sent as `OpenAI-Project`.
    #[serde(default)]
    pub project: Option<String>,
}

/// Azure OpenAI addressing.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureSettings {
    /// Resource name, used to derive `https://<resource>.openai.azure.com`.
    #[serde(default)]
    pub resource: Option<String>,
    /// Deployment name placed in the request path.
    pub deployment: String,
    /// `api-version` query parameter.
    #[serde(default)]
    pub api_version: Option<String>,
    /// Send `Authorization: Bearer` instead of the `api-key` header.
    #[serde(default)]
    pub use_bearer_auth: bool,
}

/// DashScope workspace selection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QianwenSettings {
    /// Sent as `X-DashScope-WorkspaceId`.
    #[serde(default)]
    pub workspace: Option<String>,
}

/// Anthropic protocol settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaudeSettings {
    /// Value of the `anthropic-version` header.
    #[serde(default)]
    pub api_version: Option<String>,
    /// `max_tokens` injected when the request leaves it unset.
    #[serde(default)]
    pub default_max_tokens: Option<u32>,
}

/// Price of one model, per 1,000 tokens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Price per 1,000 prompt tokens.
    pub input: f64,
    /// Price per 1,000 completion tokens.
    pub output: f64,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}
