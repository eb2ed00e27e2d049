pub(crate) mod azure;
pub(crate) mod claude;
pub(crate) mod compatible;
mod http;
pub(crate) mod openai;
pub(crate) mod qianwen;

use async_trait::async_trait;
use config::ProviderKind;
use futures::Stream;
use std::pin::Pin;

use crate::{
    messages::{Capability, ChatRequest, ChatResult, ModelInfo, Pricing, StreamEvent},
    request::RequestContext,
};

/// A finite, non-restartable sequence of stream events.
///
/// Stream failures are delivered in-band as a final [`StreamEvent::Error`].
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// One upstream vendor, speaking its own wire protocol behind a uniform contract.
///
/// Note for async_trait: the dispatcher stores adapters as `Arc<dyn Provider>`, so the
/// trait must stay dyn-compatible.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Run a synchronous completion.
    async fn generate(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<ChatResult>;

    /// Open a streamed completion.
    ///
    /// Errors that happen before the first byte of the body are returned directly,
    /// later ones end the stream with an error event.
    async fn generate_stream(&self, request: ChatRequest, context: &RequestContext) -> crate::Result<EventStream>;

    /// Models the provider serves, live-queried or from the adapter catalog.
    async fn list_models(&self, context: &RequestContext) -> crate::Result<Vec<ModelInfo>>;

    /// Cheapest meaningful upstream probe.
    async fn health_check(&self, context: &RequestContext) -> crate::Result<()>;

    /// The vendor this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// The instance name the adapter was registered under.
    fn name(&self) -> &str;

    /// Per-model prices known to the adapter.
    fn pricing(&self) -> Vec<(String, Pricing)> {
        Vec::new()
    }
}

/// A statically known model with its limits and prices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CatalogEntry {
    pub id: &'static str,
    pub display_name: &'static str,
    pub capabilities: &'static [Capability],
    pub context_window: u32,
    pub max_output_tokens: u32,
    /// Price per 1,000 prompt tokens.
    pub input_price: f64,
    /// Price per 1,000 completion tokens.
    pub output_price: f64,
    pub currency: &'static str,
}

impl CatalogEntry {
    pub fn pricing(&self) -> Pricing {
        Pricing::new(self.input_price, self.output_price, self.currency)
    }

    pub fn model_info(&self, provider: ProviderKind) -> ModelInfo {
        ModelInfo {
            id: self.id.to_string(),
            display_name: self.display_name.to_string(),
            provider,
            capabilities: self.capabilities.to_vec(),
            context_window: Some(self.context_window),
            max_output_tokens: Some(self.max_output_tokens),
            pricing: Some(self.pricing()),
        }
    }
}

/// Drops extras naming a field the adapter serializes itself, so the body never carries a key twice.
pub(crate) fn passthrough_extras(
    mut extra: serde_json::Map<String, serde_json::Value>,
    reserved: &[&str],
) -> serde_json::Map<String, serde_json::Value> {
    extra.retain(|key, _| {
        let owned = reserved.contains(&key.as_str());

        if owned {
            log::debug!("Ignoring extra request field '{key}' set by the adapter");
        }

        !owned
    });

    extra
}

pub(crate) fn catalog_models(catalog: &[CatalogEntry], provider: ProviderKind) -> Vec<ModelInfo> {
    catalog.iter().map(|entry| entry.model_info(provider)).collect()
}

pub(crate) fn catalog_pricing(catalog: &[CatalogEntry]) -> Vec<(String, Pricing)> {
    catalog
        .iter()
        .map(|entry| (entry.id.to_string(), entry.pricing()))
        .collect()
}

pub(crate) const CHAT: &[Capability] = &[Capability::Chat, Capability::Streaming];

pub(crate) const CHAT_TOOLS: &[Capability] = &[Capability::Chat, Capability::Streaming, Capability::FunctionCalling];

pub(crate) const MULTIMODAL: &[Capability] = &[
    Capability::Chat,
    Capability::Streaming,
    Capability::Vision,
    Capability::FunctionCalling,
];

pub(crate) const LONG_CONTEXT: &[Capability] = &[Capability::Chat, Capability::Streaming, Capability::LongContext];
