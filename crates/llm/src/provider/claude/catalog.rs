use crate::provider::{CatalogEntry, MULTIMODAL};

/// Anthropic models with list prices in USD per 1,000 tokens.
pub(super) const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "claude-3-5-sonnet-20241022",
        display_name: "Claude 3.5 Sonnet",
        capabilities: MULTIMODAL,
        context_window: 200_000,
        max_output_tokens: 8_192,
        input_price: 0.003,
        output_price: 0.015,
        currency: "USD",
    },
    CatalogEntry {
        id: "claude-3-5-haiku-20241022",
        display_name: "Claude 3.5 Haiku",
        capabilities: MULTIMODAL,
        context_window: 200_000,
        max_output_tokens: 8_192,
        input_price: 0.0008,
        output_price: 0.004,
        currency: "USD",
    },
    CatalogEntry {
        id: "claude-3-opus-20240229",
        display_name: "Claude 3 Opus",
        capabilities: MULTIMODAL,
        context_window: 200_000,
        max_output_tokens: 4_096,
        input_price: 0.015,
        output_price: 0.075,
        currency: "USD",
    },
    CatalogEntry {
        id: "claude-3-haiku-20240307",
        display_name: "Claude 3 Haiku",
        capabilities: MULTIMODAL,
        context_window: 200_000,
        max_output_tokens: 4_096,
        input_price: 0.00025,
        output_price: 0.00125,
        currency: "USD",
    },
];
