use crate::provider::{CHAT_TOOLS, CatalogEntry, LONG_CONTEXT};

/// Qwen models served by DashScope, prices in CNY per 1,000 tokens.
pub(super) const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "qwen-turbo",
        display_name: "Qwen Turbo",
        capabilities: CHAT_TOOLS,
        context_window: 131_072,
        max_output_tokens: 8_192,
        input_price: 0.0003,
        output_price: 0.0006,
        currency: "CNY",
    },
    CatalogEntry {
        id: "qwen-plus",
        display_name: "Qwen Plus",
        capabilities: CHAT_TOOLS,
        context_window: 131_072,
        max_output_tokens: 8_192,
        input_price: 0.0008,
        output_price: 0.002,
        currency: "CNY",
    },
    CatalogEntry {
        id: "qwen-max",
        display_name: "Qwen Max",
        capabilities: CHAT_TOOLS,
        context_window: 32_768,
        max_output_tokens: 8_192,
        input_price: 0.02,
        output_price: 0.06,
        currency: "CNY",
    },
    CatalogEntry {
        id: "qwen-long",
        display_name: "Qwen Long",
        capabilities: LONG_CONTEXT,
        context_window: 10_000_000,
        max_output_tokens: 6_000,
        input_price: 0.0005,
        output_price: 0.002,
        currency: "CNY",
    },
];
