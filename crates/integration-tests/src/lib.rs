//! Test support for end-to-end dispatch tests: scriptable vendor mocks and helpers to
//! point provider instances at them.

pub mod payloads;
mod vendor;

use std::{str::FromStr, sync::Once};

use config::{ProviderConfig, ProviderKind};
use llm::{ChatRequest, Dispatcher, Message};
use logforth::{append, filter::EnvFilter};

pub use vendor::{MockVendor, RecordedRequest, Reply, TestVendor};

static LOGGER: Once = Once::new();

/// Route the workspace logs to stderr once per test binary, filtered by `RUST_LOG`.
pub fn init_logger() {
    LOGGER.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
        let filter = EnvFilter::from_str(&filter).unwrap();

        logforth::builder()
            .dispatch(|d| d.filter(filter).append(append::Stderr::default()))
            .apply();
    });
}

/// A dispatcher with the built-in summary sink only.
pub fn dispatcher() -> Dispatcher {
    init_logger();
    Dispatcher::builder().build()
}

/// A provider configuration of `kind` whose base URL points at `path` on the mock.
pub fn provider(kind: ProviderKind, vendor: &TestVendor, path: &str) -> ProviderConfig {
    ProviderConfig::new(kind, "k").with_base_url(vendor.url(path))
}

/// A single user turn.
pub fn hello(model: &str) -> ChatRequest {
    ChatRequest::new(model, vec![Message::user("hi")])
}
