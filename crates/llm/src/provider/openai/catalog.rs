use crate::provider::{CHAT, CHAT_TOOLS, CatalogEntry, MULTIMODAL};

/// OpenAI chat models with list prices in USD per 1,000 tokens.
pub(crate) const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "gpt-4o",
        display_name: "GPT-4o",
        capabilities: MULTIMODAL,
        context_window: 128_000,
        max_output_tokens: 16_384,
        input_price: 0.0025,
        output_price: 0.01,
        currency: "USD",
    },
    CatalogEntry {
        id: "gpt-4o-mini",
        display_name: "GPT-4o mini",
        capabilities: MULTIMODAL,
        context_window: 128_000,
        max_output_tokens: 16_384,
        input_price: 0.00015,
        output_price: 0.0006,
        currency: "USD",
    },
    CatalogEntry {
        id: "gpt-4-turbo",
        display_name: "GPT-4 Turbo",
        capabilities: MULTIMODAL,
        context_window: 128_000,
        max_output_tokens: 4_096,
        input_price: 0.01,
        output_price: 0.03,
        currency: "USD",
    },
    CatalogEntry {
        id: "gpt-4",
        display_name: "GPT-4",
        capabilities: CHAT_TOOLS,
        context_window: 8_192,
        max_output_tokens: 8_192,
        input_price: 0.03,
        output_price: 0.06,
        currency: "USD",
    },
    CatalogEntry {
        id: "gpt-3.5-turbo",
        display_name: "GPT-3.5 Turbo",
        capabilities: CHAT_TOOLS,
        context_window: 16_385,
        max_output_tokens: 4_096,
        input_price: 0.0005,
        output_price: 0.0015,
        currency: "USD",
    },
    CatalogEntry {
        id: "o1",
        display_name: "o1",
        capabilities: CHAT,
        context_window: 200_000,
        max_output_tokens: 100_000,
        input_price: 0.015,
        output_price: 0.06,
        currency: "USD",
    },
    CatalogEntry {
        id: "o1-mini",
        display_name: "o1-mini",
        capabilities: CHAT,
        context_window: 128_000,
        max_output_tokens: 65_536,
        input_price: 0.003,
        output_price: 0.012,
        currency: "USD",
    },
];
