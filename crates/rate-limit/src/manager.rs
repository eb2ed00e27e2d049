//! Rate limit manager keyed by provider instance name.

use std::sync::Arc;
use std::time::Duration;

use config::RateLimitPolicy;
use dashmap::DashMap;
use mini_moka::sync::Cache;
use tokio::sync::Mutex;

use crate::error::RateLimitError;
use crate::limiter::{Limiter, RateLimitResult};

/// Holds one limiter per admission key.
///
/// Policies are registered explicitly. The limiter state behind a policy is created on first use
/// and dropped after `idle_eviction` without traffic, which resets it to a fresh limiter.
pub struct RateLimitManager {
    /// Configured policy per key.
    policies: DashMap<String, RateLimitPolicy>,
    /// Lazily created limiter state per key.
    limiters: Cache<String, Arc<Limiter>>,
    /// Lock to prevent two racing first calls from creating two limiters for one key.
    creation_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RateLimitManager {
    /// Create a manager evicting limiter state idle for longer than `idle_eviction`.
    pub fn new(idle_eviction: Duration) -> Self {
        let limiters = Cache::builder()
            .max_capacity(10000)
            .time_to_idle(idle_eviction)
            .build();

        Self {
            policies: DashMap::new(),
            limiters,
            creation_locks: DashMap::new(),
        }
    }

    /// Set or clear the policy of a key. Existing limiter state of the key is discarded.
    pub fn configure(&self, key: &str, policy: Option<RateLimitPolicy>) -> Result<(), RateLimitError> {
        self.limiters.invalidate(&key.to_string());

        match policy {
            Some(policy) => {
                // Fail at configuration time rather than on the first call.
                Limiter::from_policy(&policy)?;

                log::debug!("Configured rate limit for '{key}': {policy:?}");
                self.policies.insert(key.to_string(), policy);
            }
            None => {
                self.policies.remove(key);
            }
        }

        Ok(())
    }

    /// Forget the policy and state of a key.
    pub fn remove(&self, key: &str) {
        self.policies.remove(key);
        self.limiters.invalidate(&key.to_string());
    }

    /// Whether callers of this key wait for capacity instead of being rejected.
    pub fn waits(&self, key: &str) -> bool {
        self.policies.get(key).is_some_and(|policy| policy.wait)
    }

    /// Take one unit of capacity for the key. Keys without a policy are never limited.
    pub async fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let Some(limiter) = self.limiter(key).await? else {
            return Ok(());
        };

        let RateLimitResult { allowed, retry_after } = limiter.check();

        if allowed {
            log::debug!("Request allowed for key '{key}' - within rate limit");
            return Ok(());
        }

        log::debug!("Request blocked for key '{key}' - rate limit exceeded, retry after {retry_after:?}");

        Err(RateLimitError::LimitExceeded {
            key: key.to_string(),
            retry_after,
        })
    }

    /// Wait until the key has capacity and take it.
    ///
    /// The future never completes while the limiter stays exhausted. Callers bound it with their
    /// own deadline and cancellation.
    pub async fn acquire(&self, key: &str) -> Result<(), RateLimitError> {
        loop {
            match self.check(key).await {
                Err(RateLimitError::LimitExceeded {
                    retry_after: Some(retry_after),
                    ..
                }) => {
                    log::debug!("Waiting {retry_after:?} for rate limit capacity of '{key}'");
                    tokio::time::sleep(retry_after.max(Duration::from_millis(1))).await;
                }
                result => return result,
            }
        }
    }

    /// Feed the outcome of an admitted call to the key's limiter.
    pub fn record(&self, key: &str, success: bool) {
        if let Some(limiter) = self.limiters.get(&key.to_string()) {
            limiter.record(success);
        }
    }

    /// The refill rate in effect for the key, if its limiter has one and is alive.
    pub fn current_rate(&self, key: &str) -> Option<f64> {
        self.limiters.get(&key.to_string()).and_then(|limiter| limiter.current_rate())
    }

    async fn limiter(&self, key: &str) -> Result<Option<Arc<Limiter>>, RateLimitError> {
        let cache_key = key.to_string();

        if let Some(limiter) = self.limiters.get(&cache_key) {
            return Ok(Some(limiter));
        }

        let Some(policy) = self.policies.get(key).map(|policy| policy.clone()) else {
            return Ok(None);
        };

        let creation_lock = self
            .creation_locks
            .entry(cache_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = creation_lock.lock().await;

        // Another caller may have created it while we were waiting for the lock.
        if let Some(limiter) = self.limiters.get(&cache_key) {
            drop(guard);
            self.creation_locks.remove(&cache_key);

            return Ok(Some(limiter));
        }

        let limiter = Arc::new(Limiter::from_policy(&policy)?);
        self.limiters.insert(cache_key.clone(), limiter.clone());

        log::debug!("Created new rate limiter for key '{key}'");

        drop(guard);
        self.creation_locks.remove(&cache_key);

        Ok(Some(limiter))
    }
}

impl Default for RateLimitManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}
