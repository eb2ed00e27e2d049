use std::collections::BTreeMap;
use std::sync::Arc;

use config::CircuitBreakerConfig;
use dashmap::DashMap;

use crate::{BreakerState, CircuitBreaker, StateChangeHook, TripPredicate};

/// Breakers by admission key.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    on_state_change: Option<StateChangeHook>,
}

impl BreakerRegistry {
    /// A registry whose breakers all report transitions to `hook`.
    pub fn with_state_change_hook(hook: StateChangeHook) -> Self {
        Self {
            breakers: DashMap::new(),
            on_state_change: Some(hook),
        }
    }

    /// Install a fresh closed breaker for the key, replacing any previous one.
    pub fn insert(
        &self,
        name: &str,
        config: &CircuitBreakerConfig,
        trip: Option<TripPredicate>,
    ) -> Arc<CircuitBreaker> {
        let mut breaker = CircuitBreaker::new(name, config);

        if let Some(trip) = trip {
            breaker = breaker.with_trip_predicate(trip);
        }

        if let Some(hook) = &self.on_state_change {
            breaker = breaker.with_state_change_hook(hook.clone());
        }

        let breaker = Arc::new(breaker);
        self.breakers.insert(name.to_string(), breaker.clone());

        breaker
    }

    /// The breaker of a key.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Drop the breaker of a key.
    pub fn remove(&self, name: &str) {
        self.breakers.remove(name);
    }

    /// Current state of every breaker.
    pub fn states(&self) -> BTreeMap<String, BreakerState> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }
}
