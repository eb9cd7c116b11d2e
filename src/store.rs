//! Key/value storage shared by the response cache and the rate limiter.
//!
//! The backend is chosen once at startup: Redis when a URL is configured and
//! answers `PING`, otherwise an in-process map. A failed connection is never
//! retried, so a fleet running in fallback mode limits and caches per process.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::GateError;
use crate::redis::RedisClient;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Which backend the store settled on at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    Connected,
    Fallback,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Connected => f.write_str("connected"),
            BackendMode::Fallback => f.write_str("fallback"),
        }
    }
}

/// Outcome of one sliding-window admission step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDecision {
    pub allowed: bool,
    /// Timestamps in the window after the step.
    pub count: u64,
    /// Oldest retained timestamp, used to compute a retry hint.
    pub oldest_ms: Option<u64>,
}

pub enum Store {
    Shared(RedisClient),
    Local(LocalStore),
}

impl Store {
    /// Connect to Redis if a URL is given, falling back to local storage on
    /// any failure. Never fails.
    pub async fn connect(redis_url: Option<&str>) -> Self {
        let Some(url) = redis_url else {
            tracing::info!(
                target: "gatehouse::store",
                backend = "memory",
                "no redis url configured"
            );
            return Store::local();
        };

        match RedisClient::connect(url, CONNECT_TIMEOUT).await {
            Ok(client) => {
                tracing::info!(
                    target: "gatehouse::store",
                    backend = "redis",
                    "shared store enabled"
                );
                Store::Shared(client)
            }
            Err(e) => {
                tracing::warn!(
                    target: "gatehouse::store",
                    backend = "memory",
                    error = %e,
                    "redis unavailable, limits and cache are now per-process"
                );
                Store::local()
            }
        }
    }

    pub fn local() -> Self {
        Store::Local(LocalStore::new())
    }

    pub fn mode(&self) -> BackendMode {
        match self {
            Store::Shared(_) => BackendMode::Connected,
            Store::Local(_) => BackendMode::Fallback,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GateError> {
        match self {
            Store::Shared(client) => client.get(key).await,
            Store::Local(local) => Ok(local.get(key, now_millis())),
        }
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), GateError> {
        match self {
            Store::Shared(client) => client.set_with_expiry(key, &value, ttl.as_secs()).await,
            Store::Local(local) => {
                local.set(key, value, ttl, now_millis());
                Ok(())
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<bool, GateError> {
        match self {
            Store::Shared(client) => client.delete(key).await,
            Store::Local(local) => Ok(local.delete(key)),
        }
    }

    /// Atomically prune timestamps older than `now - window`, and record `now`
    /// if fewer than `limit` remain.
    pub async fn admit_window(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
        limit: u64,
    ) -> Result<WindowDecision, GateError> {
        match self {
            Store::Shared(client) => client.admit_window(key, now_ms, window, limit).await,
            Store::Local(local) => Ok(local.admit_window(key, now_ms, window, limit)),
        }
    }

    /// Whether the backend currently answers. Local storage always does.
    pub async fn is_available(&self) -> bool {
        match self {
            Store::Shared(client) => matches!(
                tokio::time::timeout(PING_TIMEOUT, client.ping()).await,
                Ok(Ok(_))
            ),
            Store::Local(_) => true,
        }
    }

    /// Drop expired local entries. Redis expires keys itself.
    pub fn purge_expired(&self) -> usize {
        match self {
            Store::Shared(_) => 0,
            Store::Local(local) => local.purge_expired(now_millis()),
        }
    }

    pub fn close(&self) {
        match self {
            Store::Shared(client) => {
                client.close();
                tracing::info!(target: "gatehouse::store", "redis connection released");
            }
            Store::Local(_) => {}
        }
    }
}

struct LocalEntry {
    value: Vec<u8>,
    expires_at_ms: u64,
}

#[derive(Default)]
struct LocalWindow {
    stamps: VecDeque<u64>,
    expires_at_ms: u64,
}

/// In-process backend. Each key is guarded by its map shard, so pruning and
/// deciding for one identifier never waits on an unrelated one.
#[derive(Default)]
pub struct LocalStore {
    values: DashMap<String, LocalEntry>,
    windows: DashMap<String, LocalWindow>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str, now_ms: u64) -> Option<Vec<u8>> {
        if let Some(entry) = self.values.get(key) {
            if entry.expires_at_ms > now_ms {
                return Some(entry.value.clone());
            }
        }
        self.values
            .remove_if(key, |_, entry| entry.expires_at_ms <= now_ms);
        None
    }

    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Duration, now_ms: u64) {
        let expires_at_ms = now_ms.saturating_add(ttl.as_millis() as u64);
        self.values.insert(
            key.to_string(),
            LocalEntry {
                value,
                expires_at_ms,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        let removed_value = self.values.remove(key).is_some();
        let removed_window = self.windows.remove(key).is_some();
        removed_value || removed_window
    }

    pub fn admit_window(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
        limit: u64,
    ) -> WindowDecision {
        let window_ms = window.as_millis() as u64;
        let window_start = now_ms.saturating_sub(window_ms);

        // The entry guard is held for the whole prune-count-record sequence.
        let mut entry = self.windows.entry(key.to_string()).or_default();
        while entry.stamps.front().is_some_and(|&ts| ts < window_start) {
            entry.stamps.pop_front();
        }

        let count = entry.stamps.len() as u64;
        if count >= limit {
            return WindowDecision {
                allowed: false,
                count,
                oldest_ms: entry.stamps.front().copied(),
            };
        }

        entry.stamps.push_back(now_ms);
        entry.expires_at_ms = now_ms.saturating_add(window_ms);
        WindowDecision {
            allowed: true,
            count: count + 1,
            oldest_ms: entry.stamps.front().copied(),
        }
    }

    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let initial = self.values.len() + self.windows.len();
        self.values.retain(|_, entry| entry.expires_at_ms > now_ms);
        self.windows.retain(|_, window| window.expires_at_ms > now_ms);
        initial.saturating_sub(self.values.len() + self.windows.len())
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
