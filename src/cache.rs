use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GateError;
use crate::fingerprint::Fingerprint;
use crate::store::Store;

/// Memoizes idempotent responses keyed by request fingerprint.
///
/// Failures never reach the caller: a broken backend or an undecodable payload
/// reads as a miss, and a failed write is logged and dropped. Concurrent misses
/// for the same fingerprint may both compute and both store; the last write
/// wins.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<Store>,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<Store>, default_ttl: Duration) -> Self {
        Self {
            store,
            default_ttl: default_ttl.max(Duration::from_secs(1)),
        }
    }

    pub fn key(fingerprint: &Fingerprint) -> String {
        format!("cache:{}", fingerprint)
    }

    pub async fn lookup<T: DeserializeOwned>(&self, fingerprint: &Fingerprint) -> Option<T> {
        let key = Self::key(fingerprint);
        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(target: "gatehouse::cache", key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    target: "gatehouse::cache",
                    key = %key,
                    error = %e,
                    "cache read failed"
                );
                return None;
            }
        };

        match decode(&bytes) {
            Ok(value) => {
                tracing::debug!(target: "gatehouse::cache", key = %key, "cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(
                    target: "gatehouse::cache",
                    key = %key,
                    error = %e,
                    "cached payload undecodable"
                );
                None
            }
        }
    }

    pub async fn store<T: Serialize>(
        &self,
        fingerprint: &Fingerprint,
        value: &T,
        ttl: Option<Duration>,
    ) {
        let key = Self::key(fingerprint);
        let ttl = ttl.unwrap_or(self.default_ttl).max(Duration::from_secs(1));

        let payload = match encode(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    target: "gatehouse::cache",
                    key = %key,
                    error = %e,
                    "response not serializable"
                );
                return;
            }
        };

        if let Err(e) = self.store.set(&key, payload, ttl).await {
            tracing::warn!(
                target: "gatehouse::cache",
                key = %key,
                error = %e,
                "cache write failed"
            );
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, GateError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GateError> {
    Ok(serde_json::from_slice(bytes)?)
}
