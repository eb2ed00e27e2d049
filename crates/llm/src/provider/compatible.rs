//! Vendors speaking the Chat Completions protocol: Baichuan and Zhipu ChatGLM.

use config::{ProviderConfig, ProviderKind};
use reqwest::StatusCode;

use crate::{
    error::{ErrorKind, LlmError},
    provider::{
        CHAT, CHAT_TOOLS, CatalogEntry, LONG_CONTEXT, MULTIMODAL,
        http::{self, VendorError},
        openai::{self, Endpoint, ModelSource, OpenAiProvider},
    },
};

const DEFAULT_BAICHUAN_API_URL: &str = "https://api.baichuan-ai.com/v1";
const DEFAULT_CHATGLM_API_URL: &str = "https://open.bigmodel.cn/api/paas/v4";

/// Build the adapter of an OpenAI-compatible vendor.
pub(crate) fn create(name: &str, config: &ProviderConfig) -> crate::Result<OpenAiProvider> {
    let (default_url, catalog) = match config.kind {
        ProviderKind::Baichuan => (DEFAULT_BAICHUAN_API_URL, BAICHUAN_CATALOG),
        ProviderKind::Chatglm => (DEFAULT_CHATGLM_API_URL, CHATGLM_CATALOG),
        kind => {
            return Err(LlmError::new(
                ErrorKind::InvalidConfig,
                format!("{kind} is not an OpenAI-compatible provider"),
            ));
        }
    };

    let classify: http::ErrorClassifier = if config.kind == ProviderKind::Chatglm {
        classify_chatglm_error
    } else {
        openai::classify_error
    };

    let base_url = http::base_url(config.base_url.as_ref(), default_url);

    let endpoint = Endpoint {
        kind: config.kind,
        chat_url: format!("{base_url}/chat/completions"),
        models: ModelSource::Catalog,
        headers: http::bearer_headers(&config.api_key, config.kind)?,
        catalog,
        probe_model: catalog.first().map(|entry| entry.id).unwrap_or_default().to_string(),
        classify,
        stream_usage: false,
    };

    OpenAiProvider::with_endpoint(name, config.timeout, endpoint)
}

/// ChatGLM uses OpenAI's error envelope with numeric business codes.
fn classify_chatglm_error(status: StatusCode, body: &str) -> VendorError {
    let mut vendor = openai::classify_error(status, body);

    let kind = match vendor.code.as_deref() {
        Some("1000" | "1001" | "1002" | "1003" | "1004") => ErrorKind::Unauthorized,
        Some("1113") => ErrorKind::QuotaExceeded,
        Some("1211") => ErrorKind::ModelUnavailable,
        Some("1261" | "1301") => ErrorKind::InvalidRequest,
        Some("1302" | "1303" | "1305") => ErrorKind::RateLimitedUpstream,
        Some("1304") => ErrorKind::QuotaExceeded,
        _ => return vendor,
    };

    vendor.kind = kind;
    vendor
}

/// Baichuan models, prices in CNY per 1,000 tokens.
const BAICHUAN_CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "Baichuan4",
        display_name: "Baichuan 4",
        capabilities: CHAT_TOOLS,
        context_window: 32_768,
        max_output_tokens: 2_048,
        input_price: 0.1,
        output_price: 0.1,
        currency: "CNY",
    },
    CatalogEntry {
        id: "Baichuan3-Turbo",
        display_name: "Baichuan 3 Turbo",
        capabilities: CHAT_TOOLS,
        context_window: 32_768,
        max_output_tokens: 2_048,
        input_price: 0.012,
        output_price: 0.012,
        currency: "CNY",
    },
    CatalogEntry {
        id: "Baichuan3-Turbo-128k",
        display_name: "Baichuan 3 Turbo 128k",
        capabilities: LONG_CONTEXT,
        context_window: 128_000,
        max_output_tokens: 2_048,
        input_price: 0.024,
        output_price: 0.024,
        currency: "CNY",
    },
    CatalogEntry {
        id: "Baichuan2-Turbo",
        display_name: "Baichuan 2 Turbo",
        capabilities: CHAT,
        context_window: 32_768,
        max_output_tokens: 2_048,
        input_price: 0.008,
        output_price: 0.008,
        currency: "CNY",
    },
];

/// Zhipu GLM models, prices in CNY per 1,000 tokens.
const CHATGLM_CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "glm-4-flash",
        display_name: "GLM-4 Flash",
        capabilities: CHAT_TOOLS,
        context_window: 128_000,
        max_output_tokens: 4_096,
        input_price: 0.0,
        output_price: 0.0,
        currency: "CNY",
    },
    CatalogEntry {
        id: "glm-4-plus",
        display_name: "GLM-4 Plus",
        capabilities: CHAT_TOOLS,
        context_window: 128_000,
        max_output_tokens: 4_096,
        input_price: 0.05,
        output_price: 0.05,
        currency: "CNY",
    },
    CatalogEntry {
        id: "glm-4-air",
        display_name: "GLM-4 Air",
        capabilities: CHAT_TOOLS,
        context_window: 128_000,
        max_output_tokens: 4_096,
        input_price: 0.001,
        output_price: 0.001,
        currency: "CNY",
    },
    CatalogEntry {
        id: "glm-4-long",
        display_name: "GLM-4 Long",
        capabilities: LONG_CONTEXT,
        context_window: 1_000_000,
        max_output_tokens: 4_096,
        input_price: 0.001,
        output_price: 0.001,
        currency: "CNY",
    },
    CatalogEntry {
        id: "glm-4v-plus",
        display_name: "GLM-4V Plus",
        capabilities: MULTIMODAL,
        context_window: 8_192,
        max_output_tokens: 1_024,
        input_price: 0.01,
        output_price: 0.01,
        currency: "CNY",
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{provider::Provider, request::RequestContext};

    #[tokio::test]
    async fn chatglm_serves_its_catalog() {
        let config = ProviderConfig::new(ProviderKind::Chatglm, "glm-key");
        let provider = create("glm", &config).unwrap();

        assert_eq!(provider.kind(), ProviderKind::Chatglm);

        let models = provider.list_models(&RequestContext::new()).await.unwrap();
        let ids: Vec<_> = models.iter().map(|model| model.id.as_str()).collect();

        assert_eq!(ids, vec!["glm-4-flash", "glm-4-plus", "glm-4-air", "glm-4-long", "glm-4v-plus"]);
        assert!(models.iter().all(|model| model.provider == ProviderKind::Chatglm));
    }

    #[test]
    fn chatglm_business_codes() {
        let body = r#"{"error":{"code":"1113","message":"余额不足或无可用资源包,请充值。"}}"#;
        assert_eq!(
            classify_chatglm_error(StatusCode::TOO_MANY_REQUESTS, body).kind,
            ErrorKind::QuotaExceeded
        );

        let body = r#"{"error":{"code":"1302","message":"您当前使用该API的并发数过高"}}"#;
        assert_eq!(
            classify_chatglm_error(StatusCode::TOO_MANY_REQUESTS, body).kind,
            ErrorKind::RateLimitedUpstream
        );

        let body = r#"{"error":{"code":"1211","message":"模型不存在"}}"#;
        assert_eq!(
            classify_chatglm_error(StatusCode::BAD_REQUEST, body).kind,
            ErrorKind::ModelUnavailable
        );
    }

    #[test]
    fn other_kinds_are_refused() {
        let config = ProviderConfig::new(ProviderKind::Claude, "key");
        assert_eq!(create("x", &config).err().map(|e| e.kind()), Some(ErrorKind::InvalidConfig));
    }
}
