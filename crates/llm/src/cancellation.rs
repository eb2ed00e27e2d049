//! Registry of in-flight generations that can be aborted by correlation key.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorKind, LlmError};

struct InFlight {
    id: u64,
    token: CancellationToken,
    started_at: Instant,
}

/// Maps correlation keys to the cancellation token of their in-flight call.
///
/// Bounded by the number of outstanding calls: entries live exactly as long as the
/// [`CancellationGuard`] returned by [`install`](Self::install).
#[derive(Default)]
pub struct CancellationRegistry {
    entries: DashMap<String, InFlight>,
    next_id: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token under the key. A key already in flight is refused.
    pub fn install(self: &Arc<Self>, key: &str, token: CancellationToken) -> crate::Result<CancellationGuard> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Err(LlmError::new(
                ErrorKind::InvalidRequest,
                format!("a generation with correlation key '{key}' is already in flight"),
            )),
            Entry::Vacant(entry) => {
                entry.insert(InFlight {
                    id,
                    token,
                    started_at: Instant::now(),
                });

                Ok(CancellationGuard {
                    registry: Arc::clone(self),
                    key: key.to_string(),
                    id,
                })
            }
        }
    }

    /// Cancel the generation registered under the key and forget it.
    pub fn abort(&self, key: &str) -> crate::Result<()> {
        let Some((_, in_flight)) = self.entries.remove(key) else {
            return Err(LlmError::new(
                ErrorKind::NotFound,
                format!("no generation in flight under correlation key '{key}'"),
            ));
        };

        log::debug!(
            "Aborting generation '{key}' after {:?}",
            in_flight.started_at.elapsed()
        );

        in_flight.token.cancel();

        Ok(())
    }

    /// Keys in flight with their age.
    pub fn in_flight(&self) -> Vec<(String, Duration)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.started_at.elapsed()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes its registry entry when dropped.
///
/// The entry is only removed if it is still the one this guard installed, so an abort
/// followed by a new call under the same key is left alone.
pub struct CancellationGuard {
    registry: Arc<CancellationRegistry>,
    key: String,
    id: u64,
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        self.registry
            .entries
            .remove_if(&self.key, |_, in_flight| in_flight.id == self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn abort_cancels_and_forgets() {
        let registry = Arc::new(CancellationRegistry::new());
        let token = CancellationToken::new();

        let _guard = registry.install("chat-1", token.clone()).unwrap();
        assert_eq!(registry.len(), 1);

        registry.abort("chat-1").unwrap();
        assert!(token.is_cancelled());
        assert!(registry.is_empty());

        let error = registry.abort("chat-1").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn guard_removes_entry() {
        let registry = Arc::new(CancellationRegistry::new());

        {
            let _guard = registry.install("chat-1", CancellationToken::new()).unwrap();
            assert_eq!(registry.in_flight().len(), 1);
        }

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn duplicate_key_is_refused() {
        let registry = Arc::new(CancellationRegistry::new());

        let _guard = registry.install("chat-1", CancellationToken::new()).unwrap();
        let error = registry.install("chat-1", CancellationToken::new()).err().unwrap();

        assert_eq!(error.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn stale_guard_leaves_new_entry() {
        let registry = Arc::new(CancellationRegistry::new());

        let first = registry.install("chat-1", CancellationToken::new()).unwrap();
        registry.abort("chat-1").unwrap();

        let second_token = CancellationToken::new();
        let _second = registry.install("chat-1", second_token.clone()).unwrap();

        drop(first);
        assert_eq!(registry.len(), 1);

        registry.abort("chat-1").unwrap();
        assert!(second_token.is_cancelled());
    }
}
