use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use gatehouse::services::Translator;
use gatehouse::{create_app, AppState, BackendMode, Config, Store};
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

#[derive(Default)]
struct CountingTranslator {
    calls: AtomicUsize,
}

impl Translator for CountingTranslator {
    fn translate(&self, text: &str, _src_lang: &str, tgt_lang: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        format!("[{}] {}", tgt_lang, text)
    }

    fn model_name(&self) -> &str {
        "counting"
    }
}

fn test_config() -> Config {
    Config {
        jwt_secret: "integration-secret".to_string(),
        max_upload_mb: 1,
        ..Config::default()
    }
}

async fn build_state(config: Config) -> AppState {
    let store = Arc::new(Store::connect(config.redis_url()).await);
    AppState::new(&config, store).unwrap()
}

async fn state_with(config: Config) -> Arc<AppState> {
    Arc::new(build_state(config).await)
}

fn app(state: Arc<AppState>) -> Router {
    create_app(state)
}

fn json_request(uri: &str, client: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = state_with(test_config()).await;
    let response = app(state)
        .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["store"], "fallback");
}

#[tokio::test]
async fn test_status_endpoint() {
    let state = state_with(test_config()).await;
    let response = app(state)
        .oneshot(
            Request::get("/v1/status")
                .header("x-forwarded-for", "10.0.0.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model_versions"]["translation"], "mock");
    assert_eq!(body["model_versions"]["intent"], "mock");
    assert_eq!(body["model_versions"]["ner"], "mock");
}

#[tokio::test]
async fn test_translate_is_cached() {
    let translator = Arc::new(CountingTranslator::default());
    let state = Arc::new(
        build_state(test_config())
            .await
            .with_translator(translator.clone()),
    );

    for _ in 0..3 {
        let response = app(state.clone())
            .oneshot(json_request(
                "/v1/translate",
                "10.0.0.1",
                serde_json::json!({"text": "  こんにちは  "}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["translated_text"], "[en] こんにちは");
    }
    assert_eq!(translator.calls.load(Ordering::SeqCst), 1);

    // A different target language is a different fingerprint.
    let response = app(state.clone())
        .oneshot(json_request(
            "/v1/translate",
            "10.0.0.1",
            serde_json::json!({"text": "こんにちは", "tgt_lang": "fr"}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["translated_text"], "[fr] こんにちは");
    assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_translate_rejects_empty_text() {
    let state = state_with(test_config()).await;
    let response = app(state)
        .oneshot(json_request(
            "/v1/translate",
            "10.0.0.2",
            serde_json::json!({"text": "   "}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rate_limit_exceeded() {
    let config = Config {
        rate_limit_rpm: 3,
        ..test_config()
    };
    let state = state_with(config).await;

    for i in 0..5 {
        let response = app(state.clone())
            .oneshot(json_request(
                "/v1/translate",
                "192.0.2.10",
                serde_json::json!({"text": "hello"}),
            ))
            .await
            .unwrap();

        if i < 3 {
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-ratelimit-limit"], "3");
            assert_eq!(
                response.headers()["x-ratelimit-remaining"],
                (2 - i).to_string().as_str()
            );
        } else {
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            assert!(response.headers().contains_key(header::RETRY_AFTER));
            assert_eq!(body_json(response).await["error"], "rate_limit_exceeded");
        }
    }

    // Another client is unaffected.
    let response = app(state.clone())
        .oneshot(json_request(
            "/v1/translate",
            "192.0.2.11",
            serde_json::json!({"text": "hello"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Health is never throttled.
    let response = app(state)
        .oneshot(
            Request::get("/v1/health")
                .header("x-forwarded-for", "192.0.2.10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_process_magazine_caches_by_content() {
    let state = state_with(test_config()).await;
    let upload = |bytes: &'static [u8]| {
        Request::builder()
            .method("POST")
            .uri("/v1/process-magazine?target_language=en")
            .header(header::CONTENT_TYPE, "image/png")
            .header("x-forwarded-for", "10.0.0.3")
            .body(Body::from(bytes))
            .unwrap()
    };

    let send = |bytes: &'static [u8]| {
        let request = upload(bytes);
        let app = app(state.clone());
        async move { body_json(app.oneshot(request).await.unwrap()).await }
    };

    let first = send(&b"page-one"[..]).await;
    let again = send(&b"page-one"[..]).await;
    let other = send(&b"page-two"[..]).await;

    assert_eq!(first["id"].as_str().unwrap().len(), 16);
    assert_eq!(first, again);
    assert_ne!(first["id"], other["id"]);
    assert_eq!(first["translated_text"], "Blue skirt ¥5,000. Sale this week!");
}

#[tokio::test]
async fn test_process_magazine_annotates_page() {
    let state = state_with(test_config()).await;
    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/process-magazine")
                .header(header::CONTENT_TYPE, "image/jpeg")
                .header("x-forwarded-for", "10.0.0.12")
                .body(Body::from("scan"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["target_language"], "en");
    assert_eq!(
        body["tokens"],
        serde_json::json!(["青いスカート", "¥5,000。今週のセール！"])
    );
    assert_eq!(body["intent"], serde_json::json!({"label": "product", "score": 0.6}));
    assert_eq!(body["entities"][0]["type"], "PRICE");
    assert_eq!(body["entities"][0]["currency"], "JPY");
    assert_eq!(body["entities"][1]["type"], "PRODUCT");
    assert_eq!(body["suggested_actions"][0]["action"], "search_online");
    assert_eq!(
        body["suggested_actions"][0]["payload"]["query"],
        "青いスカート ¥5,000。今週のセール！"
    );
    assert_eq!(body["warnings"], serde_json::json!([]));
}

#[tokio::test]
async fn test_predict_intent() {
    let state = state_with(test_config()).await;
    let response = app(state.clone())
        .oneshot(json_request(
            "/v1/predict-intent",
            "10.0.0.13",
            serde_json::json!({"text": "限定イベント開催", "top_k": 2}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-ratelimit-remaining"));

    let scores = body_json(response).await["scores"].clone();
    assert_eq!(scores.as_array().unwrap().len(), 2);
    assert_eq!(scores[0]["label"], "event");

    let response = app(state)
        .oneshot(json_request(
            "/v1/predict-intent",
            "10.0.0.13",
            serde_json::json!({"text": "  "}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_extract_entities() {
    let state = state_with(test_config()).await;
    let response = app(state.clone())
        .oneshot(json_request(
            "/v1/extract-entities",
            "10.0.0.14",
            serde_json::json!({"text": "Skirt $20 https://shop.test/a"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-ratelimit-remaining"));

    let body = body_json(response).await;
    let kinds: Vec<_> = body["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, ["PRICE", "URL", "PRODUCT"]);
    assert_eq!(body["entities"][0]["value"], 20.0);

    let response = app(state)
        .oneshot(json_request(
            "/v1/extract-entities",
            "10.0.0.14",
            serde_json::json!({"text": ""}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_process_magazine_rejects_bad_uploads() {
    let state = state_with(test_config()).await;

    let response = app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/process-magazine")
                .header(header::CONTENT_TYPE, "text/plain")
                .header("x-forwarded-for", "10.0.0.4")
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let too_big = vec![0u8; 1024 * 1024 + 1];
    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/process-magazine")
                .header(header::CONTENT_TYPE, "image/jpeg")
                .header("x-forwarded-for", "10.0.0.4")
                .body(Body::from(too_big))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["error"], "payload_too_large");
}

#[tokio::test]
async fn test_oversized_uploads_keep_json_errors() {
    let state = state_with(test_config()).await;
    let upload = |content_type: &str| {
        Request::builder()
            .method("POST")
            .uri("/v1/process-magazine")
            .header(header::CONTENT_TYPE, content_type)
            .header("x-forwarded-for", "10.0.0.11")
            .body(Body::from(vec![0u8; 1024 * 1024 + 4096]))
            .unwrap()
    };

    // The media type is judged before the body is buffered.
    let response = app(state.clone()).oneshot(upload("text/plain")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(body_json(response).await["error"], "unsupported_media_type");

    let response = app(state).oneshot(upload("image/png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(body_json(response).await["error"], "payload_too_large");
}

#[tokio::test]
async fn test_upload_corpus_requires_token() {
    let state = state_with(test_config()).await;
    let body = serde_json::json!({"format": "json", "dataset_name": "ads"});

    let response = app(state.clone())
        .oneshot(json_request("/v1/upload-corpus", "10.0.0.5", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = state.gate.issue("u1", 60, false).unwrap();
    let mut request = json_request("/v1/upload-corpus", "10.0.0.5", body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    let response = app(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["job_id"].as_str().unwrap().len(), 16);
}

#[tokio::test]
async fn test_invalid_and_expired_tokens_look_the_same() {
    let state = state_with(test_config()).await;
    let expired = state.gate.issue("u1", -1, false).unwrap();

    let mut bodies = Vec::new();
    for token in [expired.as_str(), "garbage.token.value"] {
        let mut request = json_request(
            "/v1/upload-corpus",
            "10.0.0.6",
            serde_json::json!({"format": "json", "dataset_name": "ads"}),
        );
        request.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        let response = app(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(body_json(response).await);
    }
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn test_train_requires_admin() {
    let state = state_with(test_config()).await;
    let body = serde_json::json!({"task": "intent"});

    let user = state.gate.issue("u1", 60, false).unwrap();
    let mut request = json_request("/v1/train", "10.0.0.7", body.clone());
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", user).parse().unwrap(),
    );
    let response = app(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = state.gate.issue("u2", 60, true).unwrap();
    let mut request = json_request("/v1/train", "10.0.0.7", body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", admin).parse().unwrap(),
    );
    let response = app(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unreachable_redis_serves_from_memory() {
    let config = Config {
        redis_url: Some("redis://127.0.0.1:1".to_string()),
        rate_limit_rpm: 2,
        ..test_config()
    };
    let state = state_with(config).await;
    assert_eq!(state.store.mode(), BackendMode::Fallback);

    let statuses: Vec<StatusCode> = {
        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = app(state.clone())
                .oneshot(json_request(
                    "/v1/translate",
                    "10.0.0.8",
                    serde_json::json!({"text": "hello"}),
                ))
                .await
                .unwrap();
            statuses.push(response.status());
        }
        statuses
    };
    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );
}
