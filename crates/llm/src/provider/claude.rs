mod catalog;
mod input;
mod output;

use std::time::Duration;

use async_trait::async_trait;
use config::{ProviderConfig, ProviderKind};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderName},
};
use secrecy::ExposeSecret;

use self::{
    catalog::CATALOG,
    input::ClaudeRequest,
    output::{ClaudeDecoder, ClaudeResponse, classify_error},
};

use crate::{
    messages::{ChatRequest, ChatResult, ModelInfo, Pricing},
    provider::{EventStream, Provider, catalog_models, catalog_pricing, http},
    request::RequestContext,
    sse,
};

const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
const VERSION_HEADER: HeaderName = HeaderName::from_static("anthropic-version");

pub(crate) struct ClaudeProvider {
    client: Client,
    base_url: String,
    name: String,
    timeout: Duration,
    default_max_tokens: u32,
}

impl ClaudeProvider {
    pub fn new(name: &str, config: &ProviderConfig) -> crate::Result<Self> {
        let kind = ProviderKind::Claude;
        let settings = config.claude.clone().unwrap_or_default();

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, http::secret_header(config.api_key.expose_secret(), kind)?);

        let version = settings.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION);
        headers.insert(VERSION_HEADER, http::header_value(version, kind)?);

        Ok(Self {
            client: http::client(kind, headers)?,
            base_url: http::base_url(config.base_url.as_ref(), DEFAULT_ANTHROPIC_API_URL),
            name: name.to_string(),
            timeout: config.timeout,
            default_max_tokens: settings.default_max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[async_trait]
impl Provider for ClaudeProvider {
    async fn generate(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResult> {
        let model = request.model.clone();
        let body = ClaudeRequest::new(request, self.default_max_tokens);

        let request = self
            .client
            .post(self.messages_url())
            .timeout(context.effective_timeout(self.timeout))
            .json(&body);

        let response = http::send(request, ProviderKind::Claude, &model, classify_error).await?;
        let response: ClaudeResponse = http::read_json(response, ProviderKind::Claude, &model).await?;

        Ok(response.into())
    }

    async fn generate_stream(&self, request: ChatRequest, _context: &RequestContext) -> crate::Result<EventStream> {
        let model = request.model.clone();

        let mut body = ClaudeRequest::new(request, self.default_max_tokens);
        body.stream = true;

        let request = self.client.post(self.messages_url()).json(&body);
        let response = http::send(request, ProviderKind::Claude, &model, classify_error).await?;

        Ok(sse::decode(response, ProviderKind::Claude, ClaudeDecoder::default()))
    }

    async fn list_models(&self, _context: &RequestContext) -> crate::Result<Vec<ModelInfo>> {
        Ok(catalog_models(CATALOG, ProviderKind::Claude))
    }

    /// Lists a single model, which costs no tokens.
    async fn health_check(&self, context: &RequestContext) -> crate::Result<()> {
        let request = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .query(&[("limit", "1")])
            .timeout(context.effective_timeout(self.timeout));

        http::send(request, ProviderKind::Claude, "", classify_error).await?;

        Ok(())
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn pricing(&self) -> Vec<(String, Pricing)> {
        catalog_pricing(CATALOG)
    }
}
