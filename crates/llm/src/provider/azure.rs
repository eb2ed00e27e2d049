//! Azure OpenAI: OpenAI's protocol behind a resource, a deployment and an API version.

use async_trait::async_trait;
use config::{ProviderConfig, ProviderKind};
use reqwest::{
    StatusCode,
    header::{HeaderMap, HeaderName},
};
use secrecy::ExposeSecret;

use crate::{
    error::{ErrorKind, LlmError},
    messages::{ChatRequest, ChatResult, ModelInfo, Pricing},
    provider::{
        EventStream, Provider,
        http::{self, VendorError},
        openai::{self, Endpoint, ModelSource, OpenAiProvider},
    },
    request::RequestContext,
};

const DEFAULT_API_VERSION: &str = "2024-02-15-preview";

const API_KEY_HEADER: HeaderName = HeaderName::from_static("api-key");

pub(crate) struct AzureProvider {
    inner: OpenAiProvider,
    deployment: String,
}

impl AzureProvider {
    pub fn new(name: &str, config: &ProviderConfig) -> crate::Result<Self> {
        let kind = ProviderKind::AzureOpenai;

        let Some(azure) = &config.azure else {
            return Err(
                LlmError::new(ErrorKind::InvalidConfig, "azure_openai providers require an [azure] section")
                    .with_provider(kind),
            );
        };

        let base_url = match (&config.base_url, &azure.resource) {
            (Some(url), _) => http::base_url(Some(url), ""),
            (None, Some(resource)) => format!("https://{resource}.openai.azure.com"),
            (None, None) => {
                return Err(LlmError::new(
                    ErrorKind::InvalidConfig,
                    "azure_openai providers need either a resource name or a base_url",
                )
                .with_provider(kind));
            }
        };

        let api_version = azure.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION);

        let headers = if azure.use_bearer_auth {
            http::bearer_headers(&config.api_key, kind)?
        } else {
            let mut headers = HeaderMap::new();
            headers.insert(API_KEY_HEADER, http::secret_header(config.api_key.expose_secret(), kind)?);
            headers
        };

        let endpoint = Endpoint {
            kind,
            chat_url: format!(
                "{base_url}/openai/deployments/{}/chat/completions?api-version={api_version}",
                azure.deployment
            ),
            models: ModelSource::Catalog,
            headers,
            catalog: openai::CATALOG,
            probe_model: azure.deployment.clone(),
            classify: classify_error,
            stream_usage: true,
        };

        Ok(Self {
            inner: OpenAiProvider::with_endpoint(name, config.timeout, endpoint)?,
            deployment: azure.deployment.clone(),
        })
    }

    /// The model behind the deployment, when the deployment is named after a known model.
    fn deployment_model(&self) -> ModelInfo {
        let mut info = match openai::CATALOG.iter().find(|entry| entry.id == self.deployment) {
            Some(entry) => entry.model_info(ProviderKind::AzureOpenai),
            None => ModelInfo::bare(ProviderKind::AzureOpenai, self.deployment.clone()),
        };

        info.id = self.deployment.clone();
        info
    }
}

/// OpenAI error bodies, plus Azure's deployment and content filter codes.
fn classify_error(status: StatusCode, body: &str) -> VendorError {
    let mut vendor = openai::classify_error(status, body);

    match vendor.code.as_deref() {
        Some("DeploymentNotFound") => vendor.kind = ErrorKind::ModelUnavailable,
        Some("content_filter") => vendor.kind = ErrorKind::InvalidRequest,
        Some("429") => vendor.kind = ErrorKind::RateLimitedUpstream,
        _ => (),
    }

    vendor
}

#[async_trait]
impl Provider for AzureProvider {
    async fn generate(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResult> {
        self.inner.generate(request, context).await
    }

    async fn generate_stream(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<EventStream> {
        self.inner.generate_stream(request, context).await
    }

    async fn list_models(&self, _context: &RequestContext) -> crate::Result<Vec<ModelInfo>> {
        Ok(vec![self.deployment_model()])
    }

    async fn health_check(&self, context: &RequestContext) -> crate::Result<()> {
        self.inner.health_check(context).await
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::AzureOpenai
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn pricing(&self) -> Vec<(String, Pricing)> {
        let mut pricing = self.inner.pricing();

        if let Some(price) = self.deployment_model().pricing {
            pricing.push((self.deployment.clone(), price));
        }

        pricing
    }
}
