use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use validator::Validate;

use crate::error::GateError;

static CORPUS_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^(json|csv)$").expect("valid corpus format pattern"));

static TRAIN_TASK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^(intent|ner)$").expect("valid train task pattern"));

/// Accepted upload content types
pub const UPLOAD_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "application/pdf"];

fn default_src_lang() -> String {
    "ja".to_string()
}

fn default_tgt_lang() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct TranslateRequest {
    pub text: String,
    #[serde(default = "default_src_lang")]
    #[validate(length(min = 2, max = 8))]
    pub src_lang: String,
    #[serde(default = "default_tgt_lang")]
    #[validate(length(min = 2, max = 8))]
    pub tgt_lang: String,
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Validate)]
pub struct PredictIntentRequest {
    pub text: String,
    #[serde(default = "default_src_lang")]
    #[validate(length(min = 2, max = 8))]
    pub lang: String,
    #[serde(default = "default_top_k")]
    #[validate(range(min = 1, max = 10))]
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExtractEntitiesRequest {
    pub text: String,
    #[serde(default = "default_src_lang")]
    #[validate(length(min = 2, max = 8))]
    pub lang: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessMagazineQuery {
    #[serde(default = "default_tgt_lang")]
    #[validate(length(min = 2, max = 8))]
    pub target_language: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UploadCorpusRequest {
    #[validate(regex(path = *CORPUS_FORMAT))]
    pub format: String,
    #[validate(length(min = 1, max = 128))]
    pub dataset_name: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TrainTriggerRequest {
    #[validate(regex(path = *TRAIN_TASK))]
    pub task: String,
}

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Trimmed, non-empty text
    pub fn require_text(text: &str) -> Result<&str, GateError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GateError::InvalidRequest("Empty text".to_string()));
        }
        Ok(text)
    }

    /// Checked from headers alone, before the body is read.
    pub fn validate_content_type(content_type: Option<&str>) -> Result<(), GateError> {
        // Ignore parameters such as `; charset=...`
        let mime = content_type
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .unwrap_or_default();

        if !UPLOAD_CONTENT_TYPES
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime))
        {
            return Err(GateError::UnsupportedMediaType(mime.to_string()));
        }
        Ok(())
    }

    pub fn validate_size(size: usize, max_bytes: usize) -> Result<(), GateError> {
        if size > max_bytes {
            return Err(GateError::PayloadTooLarge { limit: max_bytes });
        }
        if size == 0 {
            return Err(GateError::InvalidRequest("Empty upload".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text_trims() {
        assert_eq!(RequestValidator::require_text("  こんにちは \n").unwrap(), "こんにちは");
        assert!(RequestValidator::require_text("   ").is_err());
    }

    #[test]
    fn test_upload_content_types() {
        assert!(RequestValidator::validate_content_type(Some("image/png")).is_ok());
        assert!(RequestValidator::validate_content_type(Some("IMAGE/JPEG")).is_ok());
        assert!(RequestValidator::validate_content_type(Some("application/pdf; q=1")).is_ok());
        assert!(matches!(
            RequestValidator::validate_content_type(Some("text/plain")),
            Err(GateError::UnsupportedMediaType(_))
        ));
        assert!(matches!(
            RequestValidator::validate_content_type(None),
            Err(GateError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_upload_size() {
        assert!(RequestValidator::validate_size(100, 100).is_ok());
        assert!(matches!(
            RequestValidator::validate_size(101, 100),
            Err(GateError::PayloadTooLarge { limit: 100 })
        ));
        assert!(RequestValidator::validate_size(0, 100).is_err());
    }

    #[test]
    fn test_predict_intent_request() {
        let req: PredictIntentRequest =
            serde_json::from_value(serde_json::json!({"text": "¥500"})).unwrap();
        assert_eq!(req.top_k, 3);
        assert_eq!(req.lang, "ja");
        assert!(req.validate().is_ok());

        let bad: PredictIntentRequest =
            serde_json::from_value(serde_json::json!({"text": "¥500", "top_k": 11})).unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_corpus_request() {
        let ok: UploadCorpusRequest =
            serde_json::from_value(serde_json::json!({"format": "csv", "dataset_name": "ads"}))
                .unwrap();
        assert!(ok.validate().is_ok());

        let bad: UploadCorpusRequest =
            serde_json::from_value(serde_json::json!({"format": "xml", "dataset_name": "ads"}))
                .unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_train_request() {
        let ok: TrainTriggerRequest =
            serde_json::from_value(serde_json::json!({"task": "ner"})).unwrap();
        assert!(ok.validate().is_ok());

        let bad: TrainTriggerRequest =
            serde_json::from_value(serde_json::json!({"task": "all"})).unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_translate_defaults() {
        let req: TranslateRequest =
            serde_json::from_value(serde_json::json!({"text": "hi"})).unwrap();
        assert_eq!(req.src_lang, "ja");
        assert_eq!(req.tgt_lang, "en");
        assert!(req.validate().is_ok());
    }
}
