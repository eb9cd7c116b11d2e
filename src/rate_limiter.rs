use std::sync::Arc;
use std::time::Duration;

use crate::store::{now_millis, Store};

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u64 },
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Sliding-window limiter keyed by client identifier.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<Store>,
    limit: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<Store>, limit: u64, window: Duration) -> Self {
        Self {
            store,
            limit: limit.max(1),
            window,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    fn key(identifier: &str) -> String {
        format!("rl:{}", identifier)
    }

    pub async fn admit(&self, identifier: &str) -> Admission {
        self.admit_at(identifier, now_millis()).await
    }

    /// Admission check at an explicit time in Unix milliseconds.
    ///
    /// A backend failure admits the request: an unreachable store must not
    /// take the whole API down with it.
    pub async fn admit_at(&self, identifier: &str, now_ms: u64) -> Admission {
        let key = Self::key(identifier);
        let decision = match self
            .store
            .admit_window(&key, now_ms, self.window, self.limit)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    target: "gatehouse::rate_limiter",
                    identifier = %identifier,
                    error = %e,
                    "rate limit backend failed, admitting request"
                );
                return Admission::Allowed { remaining: 0 };
            }
        };

        if decision.allowed {
            return Admission::Allowed {
                remaining: self.limit.saturating_sub(decision.count),
            };
        }

        let retry_after = self.retry_after(decision.oldest_ms, now_ms);
        tracing::info!(
            target: "gatehouse::rate_limiter",
            identifier = %identifier,
            in_window = decision.count,
            retry_after_secs = retry_after.as_secs(),
            "rate limit exceeded"
        );
        Admission::Denied { retry_after }
    }

    /// Time until the oldest stamp leaves the window, rounded up to a second.
    fn retry_after(&self, oldest_ms: Option<u64>, now_ms: u64) -> Duration {
        let window_ms = self.window.as_millis() as u64;
        let wait_ms = oldest_ms
            .map(|oldest| oldest.saturating_add(window_ms).saturating_sub(now_ms))
            .unwrap_or(window_ms);
        Duration::from_secs(wait_ms.div_ceil(1000).max(1))
    }

    /// Forget all recorded requests for an identifier.
    pub async fn reset(&self, identifier: &str) -> bool {
        match self.store.delete(&Self::key(identifier)).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(
                    target: "gatehouse::rate_limiter",
                    identifier = %identifier,
                    error = %e,
                    "reset failed"
                );
                false
            }
        }
    }
}
