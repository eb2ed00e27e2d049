mod catalog;
mod input;
mod output;

use std::time::Duration;

use async_trait::async_trait;
use config::{ProviderConfig, ProviderKind};
use reqwest::{
    Client,
    header::{HeaderName, HeaderValue},
};

use self::{
    catalog::CATALOG,
    input::QianwenRequest,
    output::{QianwenDecoder, QianwenResponse, classify_error},
};

use crate::{
    messages::{ChatRequest, ChatResult, Message, ModelInfo, Pricing},
    provider::{EventStream, Provider, catalog_models, catalog_pricing, http},
    request::RequestContext,
    sse,
};

const DEFAULT_DASHSCOPE_API_URL: &str = "https://dashscope.aliyuncs.com/api/v1";
const GENERATION_PATH: &str = "/services/aigc/text-generation/generation";

const SSE_HEADER: HeaderName = HeaderName::from_static("x-dashscope-sse");
const WORKSPACE_HEADER: HeaderName = HeaderName::from_static("x-dashscope-workspaceid");

const PROBE_MODEL: &str = "qwen-turbo";

pub(crate) struct QianwenProvider {
    client: Client,
    generation_url: String,
    name: String,
    timeout: Duration,
}

impl QianwenProvider {
    pub fn new(name: &str, config: &ProviderConfig) -> crate::Result<Self> {
        let kind = ProviderKind::Qianwen;
        let mut headers = http::bearer_headers(&config.api_key, kind)?;

        if let Some(workspace) = config.qianwen.as_ref().and_then(|settings| settings.workspace.as_deref()) {
            headers.insert(WORKSPACE_HEADER, http::header_value(workspace, kind)?);
        }

        let base_url = http::base_url(config.base_url.as_ref(), DEFAULT_DASHSCOPE_API_URL);

        Ok(Self {
            client: http::client(kind, headers)?,
            generation_url: format!("{base_url}{GENERATION_PATH}"),
            name: name.to_string(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl Provider for QianwenProvider {
    async fn generate(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResult> {
        let model = request.model.clone();
        let body = QianwenRequest::from(request);

        let request = self
            .client
            .post(&self.generation_url)
            .timeout(context.effective_timeout(self.timeout))
            .json(&body);

        let response = http::send(request, ProviderKind::Qianwen, &model, classify_error).await?;
        let response: QianwenResponse = http::read_json(response, ProviderKind::Qianwen, &model).await?;

        Ok(response.into_result(&model))
    }

    async fn generate_stream(&self, request: ChatRequest, _context: &RequestContext) -> crate::Result<EventStream> {
        let model = request.model.clone();

        let mut body = QianwenRequest::from(request);
        body.parameters.incremental_output = true;

        let request = self
            .client
            .post(&self.generation_url)
            .header(SSE_HEADER, HeaderValue::from_static("enable"))
            .json(&body);

        let response = http::send(request, ProviderKind::Qianwen, &model, classify_error).await?;

        Ok(sse::decode(response, ProviderKind::Qianwen, QianwenDecoder::default()))
    }

    async fn list_models(&self, _context: &RequestContext) -> crate::Result<Vec<ModelInfo>> {
        Ok(catalog_models(CATALOG, ProviderKind::Qianwen))
    }

    /// DashScope has no listing endpoint; a one-token generation on the cheapest model.
    async fn health_check(&self, context: &RequestContext) -> crate::Result<()> {
        let mut probe = ChatRequest::new(PROBE_MODEL, vec![Message::user("ping")]);
        probe.max_tokens = Some(1);

        self.generate(probe, context).await.map(|_| ())
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Qianwen
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn pricing(&self) -> Vec<(String, Pricing)> {
        catalog_pricing(CATALOG)
    }
}
