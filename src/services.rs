//! Model collaborators. Only deterministic mocks live here; real models plug
//! in behind the same traits.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::LazyLock;

static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[¥$]\s?\d{1,3}(?:[,.]\d{3})*(?:\.\d{2})?").expect("valid price pattern")
});

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid url pattern"));

static SKIRT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)skirt").expect("valid product pattern"));

const INTENT_LABELS: [(&str, f64); 5] = [
    ("product", 0.2),
    ("recipe", 0.1),
    ("event", 0.1),
    ("advertisement", 0.2),
    ("article", 0.1),
];

const EVENT_KEYWORDS: [&str; 4] = ["イベント", "開催", "ticket", "event"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentScore {
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    /// Character offsets into the analysed text.
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub confidence: Option<f64>,
    pub value: Option<f64>,
    pub currency: Option<String>,
}

impl Entity {
    fn span(kind: &str, text: &str, start: usize, confidence: f64) -> Self {
        Self {
            kind: kind.to_string(),
            text: text.to_string(),
            start: Some(start),
            end: Some(start + text.chars().count()),
            confidence: Some(confidence),
            value: None,
            currency: None,
        }
    }
}

pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, image: &[u8]) -> String;
}

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, src_lang: &str, tgt_lang: &str) -> String;

    fn model_name(&self) -> &str;
}

pub trait IntentClassifier: Send + Sync {
    /// Highest scoring labels first, at most `top_k` of them.
    fn predict(&self, text: &str, top_k: usize) -> Vec<IntentScore>;

    fn model_name(&self) -> &str;
}

pub trait EntityExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<Entity>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Default, Clone)]
pub struct MockOcr;

impl TextExtractor for MockOcr {
    fn extract_text(&self, _image: &[u8]) -> String {
        "青いスカート ¥5,000。今週のセール！".to_string()
    }
}

#[derive(Debug, Default, Clone)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockTranslator;

impl Translator for MockTranslator {
    fn translate(&self, _text: &str, _src_lang: &str, _tgt_lang: &str) -> String {
        "Blue skirt ¥5,000. Sale this week!".to_string()
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Keyword heuristic: prices point to products and ads, event words to events.
#[derive(Debug, Default, Clone)]
pub struct MockIntentClassifier;

impl IntentClassifier for MockIntentClassifier {
    fn predict(&self, text: &str, top_k: usize) -> Vec<IntentScore> {
        let priced = text.contains('¥') || text.contains('$');
        let eventful = EVENT_KEYWORDS.iter().any(|keyword| text.contains(keyword));

        let mut scores: Vec<IntentScore> = INTENT_LABELS
            .iter()
            .map(|&(label, base)| {
                let boost = match label {
                    "product" if priced => 0.4,
                    "advertisement" if priced => 0.2,
                    "event" if eventful => 0.4,
                    _ => 0.0,
                };
                IntentScore {
                    label: label.to_string(),
                    score: base + boost,
                }
            })
            .collect();

        // Stable, so ties keep label order.
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scores.truncate(top_k.clamp(1, INTENT_LABELS.len()));
        scores
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Pattern matcher for prices, links and a couple of known products.
#[derive(Debug, Default, Clone)]
pub struct MockEntityExtractor;

fn char_offset(text: &str, byte_idx: usize) -> usize {
    text[..byte_idx].chars().count()
}

fn parse_price(raw: &str) -> Option<f64> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}

impl EntityExtractor for MockEntityExtractor {
    fn extract(&self, text: &str) -> Vec<Entity> {
        let mut entities = Vec::new();

        for m in PRICE.find_iter(text) {
            let mut entity = Entity::span("PRICE", m.as_str(), char_offset(text, m.start()), 0.9);
            entity.value = parse_price(m.as_str());
            entity.currency = m.as_str().contains('¥').then(|| "JPY".to_string());
            entities.push(entity);
        }

        for m in URL.find_iter(text) {
            entities.push(Entity::span("URL", m.as_str(), char_offset(text, m.start()), 0.9));
        }

        if let Some(idx) = text.find("スカート") {
            entities.push(Entity::span("PRODUCT", "スカート", char_offset(text, idx), 0.8));
        }
        if let Some(m) = SKIRT.find(text) {
            entities.push(Entity::span("PRODUCT", m.as_str(), char_offset(text, m.start()), 0.8));
        }

        entities
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
