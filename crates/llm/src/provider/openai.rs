mod catalog;
mod input;
mod output;

pub(crate) use self::{catalog::CATALOG, output::classify_error};

use std::time::Duration;

use async_trait::async_trait;
use config::{ProviderConfig, ProviderKind};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderName},
};

use self::{
    input::{OpenAiRequest, StreamOptions},
    output::{OpenAiDecoder, OpenAiModelsResponse, OpenAiResponse},
};

use crate::{
    messages::{ChatRequest, ChatResult, Message, ModelInfo, Pricing},
    provider::{
        CatalogEntry, EventStream, Provider, catalog_models, catalog_pricing,
        http::{self, ErrorClassifier},
    },
    request::RequestContext,
    sse,
};

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";

const ORGANIZATION_HEADER: HeaderName = HeaderName::from_static("openai-organization");
const PROJECT_HEADER: HeaderName = HeaderName::from_static("openai-project");

/// Where the model list of an OpenAI-compatible upstream comes from.
pub(crate) enum ModelSource {
    /// `GET` on the given URL, annotated from the catalog. Also used as health probe.
    Live(String),
    /// The adapter catalog. Health is probed with a one-token generation.
    Catalog,
}

/// Addressing and protocol details of one OpenAI-compatible upstream.
pub(crate) struct Endpoint {
    pub kind: ProviderKind,
    pub chat_url: String,
    pub models: ModelSource,
    /// Authentication and account headers sent on every call.
    pub headers: HeaderMap,
    pub catalog: &'static [CatalogEntry],
    /// Model used by the one-token health probe.
    pub probe_model: String,
    pub classify: ErrorClassifier,
    /// Whether the upstream understands `stream_options.include_usage`.
    pub stream_usage: bool,
}

/// Chat Completions adapter. Serves OpenAI directly, and Azure OpenAI, Baichuan and
/// ChatGLM through their own [`Endpoint`].
pub(crate) struct OpenAiProvider {
    client: Client,
    name: String,
    timeout: Duration,
    endpoint: Endpoint,
}

impl OpenAiProvider {
    pub fn new(name: &str, config: &ProviderConfig) -> crate::Result<Self> {
        let kind = ProviderKind::Openai;
        let base_url = http::base_url(config.base_url.as_ref(), DEFAULT_OPENAI_API_URL);
        let mut headers = http::bearer_headers(&config.api_key, kind)?;

        if let Some(settings) = &config.openai {
            if let Some(organization) = &settings.organization {
                headers.insert(ORGANIZATION_HEADER, http::header_value(organization, kind)?);
            }

            if let Some(project) = &settings.project {
                headers.insert(PROJECT_HEADER, http::header_value(project, kind)?);
            }
        }

        let endpoint = Endpoint {
            kind,
            chat_url: format!("{base_url}/chat/completions"),
            models: ModelSource::Live(format!("{base_url}/models")),
            headers,
            catalog: CATALOG,
            probe_model: "gpt-4o-mini".to_string(),
            classify: classify_error,
            stream_usage: true,
        };

        Self::with_endpoint(name, config.timeout, endpoint)
    }

    pub fn with_endpoint(name: &str, timeout: Duration, mut endpoint: Endpoint) -> crate::Result<Self> {
        let headers = std::mem::take(&mut endpoint.headers);
        let client = http::client(endpoint.kind, headers)?;

        Ok(Self {
            client,
            name: name.to_string(),
            timeout,
            endpoint,
        })
    }

    async fn fetch_models(&self, url: &str, context: &RequestContext) -> crate::Result<OpenAiModelsResponse> {
        let request = self.client.get(url).timeout(context.effective_timeout(self.timeout));
        let response = http::send(request, self.endpoint.kind, "", self.endpoint.classify).await?;

        http::read_json(response, self.endpoint.kind, "").await
    }

    fn annotate(&self, id: String) -> ModelInfo {
        match self.endpoint.catalog.iter().find(|entry| entry.id == id) {
            Some(entry) => entry.model_info(self.endpoint.kind),
            None => ModelInfo::bare(self.endpoint.kind, id),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn generate(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResult> {
        let model = request.model.clone();
        let body = OpenAiRequest::from(request);

        let request = self
            .client
            .post(&self.endpoint.chat_url)
            .timeout(context.effective_timeout(self.timeout))
            .json(&body);

        let response = http::send(request, self.endpoint.kind, &model, self.endpoint.classify).await?;
        let response: OpenAiResponse = http::read_json(response, self.endpoint.kind, &model).await?;

        Ok(response.into_result(&model))
    }

    async fn generate_stream(&self, request: ChatRequest, _context: &RequestContext) -> crate::Result<EventStream> {
        let model = request.model.clone();

        let mut body = OpenAiRequest::from(request);
        body.stream = true;

        if self.endpoint.stream_usage {
            body.stream_options = Some(StreamOptions { include_usage: true });
        }

        let request = self.client.post(&self.endpoint.chat_url).json(&body);
        let response = http::send(request, self.endpoint.kind, &model, self.endpoint.classify).await?;

        Ok(sse::decode(response, self.endpoint.kind, OpenAiDecoder::default()))
    }

    async fn list_models(&self, context: &RequestContext) -> crate::Result<Vec<ModelInfo>> {
        let url = match &self.endpoint.models {
            ModelSource::Live(url) => url,
            ModelSource::Catalog => return Ok(catalog_models(self.endpoint.catalog, self.endpoint.kind)),
        };

        let response = self.fetch_models(url, context).await?;

        let total_models = response.data.len();
        let chat_models = response
            .data
            .into_iter()
            .filter(|model| is_chat_model(&model.id))
            .map(|model| self.annotate(model.id))
            .collect::<Vec<_>>();

        log::debug!(
            "{} models: kept {} chat-compatible models out of {}",
            self.name,
            chat_models.len(),
            total_models
        );

        Ok(chat_models)
    }

    async fn health_check(&self, context: &RequestContext) -> crate::Result<()> {
        match &self.endpoint.models {
            ModelSource::Live(url) => self.fetch_models(url, context).await.map(|_| ()),
            ModelSource::Catalog => {
                let mut probe = ChatRequest::new(self.endpoint.probe_model.clone(), vec![Message::user("ping")]);
                probe.max_tokens = Some(1);

                self.generate(probe, context).await.map(|_| ())
            }
        }
    }

    fn kind(&self) -> ProviderKind {
        self.endpoint.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn pricing(&self) -> Vec<(String, Pricing)> {
        catalog_pricing(self.endpoint.catalog)
    }
}

/// Whether a listed model works with the chat completions endpoint.
fn is_chat_model(id: &str) -> bool {
    const EXCLUDED: &[&str] = &[
        "embedding",
        "whisper",
        "tts",
        "dall-e",
        "davinci",
        "babbage",
        "search",
        "audio",
        "moderation",
        "realtime",
        "transcribe",
    ];

    if EXCLUDED.iter().any(|excluded| id.contains(excluded)) {
        log::debug!("Filtering out non-chat model: {id}");
        return false;
    }

    id.starts_with("gpt") || id.starts_with("o1") || id.starts_with("o3") || id.starts_with("chatgpt")
}
