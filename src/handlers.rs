use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use std::collections::HashMap;
use std::time::Instant;
use validator::Validate;

use crate::error::GateError;
use crate::extractors::{AdminUser, AuthUser};
use crate::fingerprint::{content_id, Fingerprint};
use crate::response::{
    ExtractEntitiesResponse, HealthResponse, JobResponse, PredictIntentResponse,
    ProcessMagazineResponse, StatusResponse, SuggestedAction, TranslateResponse,
};
use crate::server::SharedState;
use crate::services::IntentScore;
use crate::store::now_millis;
use crate::validation::{
    ExtractEntitiesRequest, PredictIntentRequest, ProcessMagazineQuery, RequestValidator,
    TrainTriggerRequest, TranslateRequest, UploadCorpusRequest,
};

const JOB_ID_LEN: usize = 16;

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let reachable = state.store.is_available().await;
    Json(HealthResponse::new(state.store.mode(), reachable))
}

pub async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let model_versions = HashMap::from([
        ("app".to_string(), env!("CARGO_PKG_VERSION").to_string()),
        ("translation".to_string(), state.translator.model_name().to_string()),
        ("intent".to_string(), state.intent.model_name().to_string()),
        ("ner".to_string(), state.ner.model_name().to_string()),
    ]);

    Json(StatusResponse {
        status: "ok".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
        model_versions,
    })
}

/// Translate text, memoized on (source, target, text).
pub async fn translate(
    State(state): State<SharedState>,
    Json(req): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, GateError> {
    req.validate()?;
    let text = RequestValidator::require_text(&req.text)?;

    let parts = [req.src_lang.as_str(), req.tgt_lang.as_str(), text];
    let fingerprint = Fingerprint::of("translate", &parts);
    if let Some(cached) = state.cache.lookup::<TranslateResponse>(&fingerprint).await {
        return Ok(Json(cached));
    }

    let response = TranslateResponse {
        translated_text: state.translator.translate(text, &req.src_lang, &req.tgt_lang),
    };
    state.cache.store(&fingerprint, &response, None).await;
    Ok(Json(response))
}

pub async fn predict_intent(
    State(state): State<SharedState>,
    Json(req): Json<PredictIntentRequest>,
) -> Result<Json<PredictIntentResponse>, GateError> {
    req.validate()?;
    let text = RequestValidator::require_text(&req.text)?;

    Ok(Json(PredictIntentResponse {
        scores: state.intent.predict(text, req.top_k),
    }))
}

pub async fn extract_entities(
    State(state): State<SharedState>,
    Json(req): Json<ExtractEntitiesRequest>,
) -> Result<Json<ExtractEntitiesResponse>, GateError> {
    req.validate()?;
    let text = RequestValidator::require_text(&req.text)?;

    Ok(Json(ExtractEntitiesResponse {
        entities: state.ner.extract(text),
    }))
}

/// Body buffering failures still answer with the JSON error body.
fn upload_rejection(rejection: BytesRejection, limit: usize) -> GateError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GateError::PayloadTooLarge { limit }
    } else {
        GateError::InvalidRequest(rejection.body_text())
    }
}

fn top_intent(mut scores: Vec<IntentScore>) -> IntentScore {
    if scores.is_empty() {
        return IntentScore {
            label: "unknown".to_string(),
            score: 0.0,
        };
    }
    let mut top = scores.swap_remove(0);
    top.score = (top.score * 100.0).round() / 100.0;
    top
}

/// OCR and analyse an uploaded page, memoized on (target language, content).
pub async fn process_magazine(
    State(state): State<SharedState>,
    Query(query): Query<ProcessMagazineQuery>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ProcessMagazineResponse>, GateError> {
    query.validate()?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    RequestValidator::validate_content_type(content_type)?;

    let body = body.map_err(|rejection| upload_rejection(rejection, state.max_upload_bytes))?;
    RequestValidator::validate_size(body.len(), state.max_upload_bytes)?;

    let started = Instant::now();
    let id = content_id(&body);
    let fingerprint = Fingerprint::of("process", &[query.target_language.as_str(), id.as_str()]);
    if let Some(cached) = state.cache.lookup::<ProcessMagazineResponse>(&fingerprint).await {
        return Ok(Json(cached));
    }

    let original_text = state.ocr.extract_text(&body);
    let mut warnings = Vec::new();
    if original_text.trim().is_empty() {
        warnings.push("No text detected".to_string());
    }

    let tokens = state.tokenizer.tokenize(&original_text);
    let translated_text = state
        .translator
        .translate(&original_text, "ja", &query.target_language);
    let intent = top_intent(state.intent.predict(&original_text, 1));
    let entities = state.ner.extract(&original_text);

    let mut suggested_actions = Vec::new();
    if !entities.is_empty() {
        suggested_actions.push(SuggestedAction::search_online(&original_text));
    }

    let response = ProcessMagazineResponse {
        id,
        original_text,
        translated_text,
        target_language: query.target_language,
        tokens,
        intent,
        entities,
        suggested_actions,
        warnings,
        processing_time_ms: started.elapsed().as_millis() as u64,
    };
    state.cache.store(&fingerprint, &response, None).await;
    Ok(Json(response))
}

pub async fn upload_corpus(
    AuthUser(claims): AuthUser,
    Json(req): Json<UploadCorpusRequest>,
) -> Result<Json<JobResponse>, GateError> {
    req.validate()?;
    let issued_at = now_millis().to_string();
    let job_id = Fingerprint::of(
        "upload-corpus",
        &[req.dataset_name.as_str(), claims.sub.as_str(), issued_at.as_str()],
    );
    tracing::info!(
        target: "gatehouse::handlers",
        subject = %claims.sub,
        dataset = %req.dataset_name,
        format = %req.format,
        job_id = %job_id,
        "corpus upload accepted"
    );

    Ok(Json(JobResponse {
        job_id: job_id.as_str()[..JOB_ID_LEN].to_string(),
    }))
}

pub async fn train(
    AdminUser(claims): AdminUser,
    Json(req): Json<TrainTriggerRequest>,
) -> Result<Json<JobResponse>, GateError> {
    req.validate()?;
    let issued_at = now_millis().to_string();
    let job_id = Fingerprint::of(
        "train",
        &[req.task.as_str(), claims.sub.as_str(), issued_at.as_str()],
    );
    tracing::info!(
        target: "gatehouse::handlers",
        subject = %claims.sub,
        task = %req.task,
        job_id = %job_id,
        "training triggered"
    );

    Ok(Json(JobResponse {
        job_id: job_id.as_str()[..JOB_ID_LEN].to_string(),
    }))
}
