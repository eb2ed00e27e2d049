//! Construction of adapters from typed provider configuration.

use std::sync::Arc;

use config::{ProviderConfig, ProviderKind};

use crate::{
    error::{ErrorKind, LlmError},
    provider::{
        Provider, azure::AzureProvider, claude::ClaudeProvider, compatible, openai::OpenAiProvider,
        qianwen::QianwenProvider,
    },
};

/// Create the adapter matching the configuration's kind.
///
/// The configuration is validated first, so an empty key fails with `missing_credential`
/// and a kind-specific section that does not match the kind with `invalid_config`.
pub fn create_provider(name: &str, config: &ProviderConfig) -> crate::Result<Arc<dyn Provider>> {
    config
        .validate()
        .map_err(|e| LlmError::from(e).with_provider(config.kind))?;

    let provider: Arc<dyn Provider> = match config.kind {
        ProviderKind::Openai => Arc::new(OpenAiProvider::new(name, config)?),
        ProviderKind::AzureOpenai => Arc::new(AzureProvider::new(name, config)?),
        ProviderKind::Qianwen => Arc::new(QianwenProvider::new(name, config)?),
        ProviderKind::Claude => Arc::new(ClaudeProvider::new(name, config)?),
        ProviderKind::Baichuan | ProviderKind::Chatglm => Arc::new(compatible::create(name, config)?),
    };

    log::debug!("Created {} adapter '{name}'", config.kind);

    Ok(provider)
}

/// Resolve a provider kind by its configuration name.
pub fn parse_kind(kind: &str) -> crate::Result<ProviderKind> {
    kind.parse()
        .map_err(|_| LlmError::new(ErrorKind::InvalidConfig, format!("unknown provider kind '{kind}'")))
}
