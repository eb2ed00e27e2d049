use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;
use config::ProviderKind;

use crate::messages::{Pricing, Usage};

type PriceMap = HashMap<ProviderKind, HashMap<String, Pricing>>;

/// Prices per `(kind, model)`, read without locking and replaced copy-on-write.
#[derive(Default)]
pub struct PricingTable {
    prices: ArcSwap<PriceMap>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The price of a model, if known.
    pub fn get(&self, kind: ProviderKind, model: &str) -> Option<Pricing> {
        self.prices.load().get(&kind)?.get(model).cloned()
    }

    /// Set the price of one model.
    pub fn update(&self, kind: ProviderKind, model: &str, pricing: Pricing) {
        self.extend(kind, [(model.to_string(), pricing)]);
    }

    /// Set the prices of several models of one kind in a single swap.
    pub fn extend(&self, kind: ProviderKind, prices: impl IntoIterator<Item = (String, Pricing)>) {
        let prices: Vec<_> = prices.into_iter().collect();

        if prices.is_empty() {
            return;
        }

        self.prices.rcu(|current| {
            let mut next = PriceMap::clone(current);
            next.entry(kind).or_default().extend(prices.iter().cloned());

            Arc::new(next)
        });
    }

    /// Estimated cost of a call with its currency. Unknown models cost nothing.
    pub fn cost(&self, kind: ProviderKind, model: &str, usage: &Usage) -> (f64, Option<String>) {
        match self.get(kind, model) {
            Some(pricing) => (cost(&pricing, usage), Some(pricing.currency)),
            None => (0.0, None),
        }
    }
}

/// `prompt / 1000 * input + completion / 1000 * output`.
pub fn cost(pricing: &Pricing, usage: &Usage) -> f64 {
    f64::from(usage.prompt_tokens) / 1000.0 * pricing.input + f64::from(usage.completion_tokens) / 1000.0 * pricing.output
}
