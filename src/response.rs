use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::services::{Entity, IntentScore};
use crate::store::BackendMode;

/// Longest prefix of the source text used as a search query.
const SEARCH_QUERY_CHARS: usize = 120;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranslateResponse {
    pub translated_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessMagazineResponse {
    pub id: String,
    pub original_text: String,
    pub translated_text: String,
    pub target_language: String,
    pub tokens: Vec<String>,
    pub intent: IntentScore,
    pub entities: Vec<Entity>,
    pub suggested_actions: Vec<SuggestedAction>,
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestedAction {
    pub action: String,
    pub label: String,
    pub payload: HashMap<String, serde_json::Value>,
}

impl SuggestedAction {
    /// Offer an online search for the product text.
    pub fn search_online(text: &str) -> Self {
        let query: String = text.chars().take(SEARCH_QUERY_CHARS).collect();
        Self {
            action: "search_online".to_string(),
            label: "Search this product online".to_string(),
            payload: HashMap::from([("query".to_string(), serde_json::Value::String(query))]),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictIntentResponse {
    pub scores: Vec<IntentScore>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractEntitiesResponse {
    pub entities: Vec<Entity>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub store: BackendMode,
}

impl HealthResponse {
    /// `reachable` is the result of probing the backend for this request.
    pub fn new(store: BackendMode, reachable: bool) -> Self {
        let status = match store {
            BackendMode::Connected if reachable => "healthy",
            // Serving from process memory, or Redis stopped answering.
            _ => "degraded",
        };
        Self {
            status: status.to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub uptime_seconds: f64,
    pub model_versions: HashMap<String, String>,
}
