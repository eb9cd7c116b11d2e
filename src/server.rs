use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::ClaimsGate;
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::GateError;
use crate::handlers::{
    extract_entities, health, predict_intent, process_magazine, status, train, translate,
    upload_corpus,
};
use crate::middleware::{admission_middleware, logging_middleware, security_headers_middleware};
use crate::rate_limiter::RateLimiter;
use crate::services::{
    EntityExtractor, IntentClassifier, MockEntityExtractor, MockIntentClassifier, MockOcr,
    MockTranslator, TextExtractor, Tokenizer, Translator, WhitespaceTokenizer,
};
use crate::store::Store;

/// Shared application state
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub store: Arc<Store>,
    pub cache: ResponseCache,
    pub rate_limiter: RateLimiter,
    pub gate: ClaimsGate,
    pub ocr: Arc<dyn TextExtractor>,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub translator: Arc<dyn Translator>,
    pub intent: Arc<dyn IntentClassifier>,
    pub ner: Arc<dyn EntityExtractor>,
    pub max_upload_bytes: usize,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every component around one store handle.
    pub fn new(config: &Config, store: Arc<Store>) -> Result<Self, GateError> {
        Ok(Self {
            cache: ResponseCache::new(store.clone(), config.cache_ttl()),
            rate_limiter: RateLimiter::new(
                store.clone(),
                config.rate_limit_rpm,
                config.rate_limit_window(),
            ),
            gate: ClaimsGate::from_config(config)?,
            ocr: Arc::new(MockOcr),
            tokenizer: Arc::new(WhitespaceTokenizer),
            translator: Arc::new(MockTranslator),
            intent: Arc::new(MockIntentClassifier),
            ner: Arc::new(MockEntityExtractor),
            max_upload_bytes: config.max_upload_bytes(),
            started_at: Instant::now(),
            store,
        })
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }
}

pub fn create_app(state: SharedState) -> Router {
    // Health stays reachable for probes even when a client is throttled.
    let limited = Router::new()
        .route("/v1/status", get(status))
        .route("/v1/translate", post(translate))
        .route("/v1/predict-intent", post(predict_intent))
        .route("/v1/extract-entities", post(extract_entities))
        .route("/v1/process-magazine", post(process_magazine))
        .route("/v1/upload-corpus", post(upload_corpus))
        .route("/v1/train", post(train))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admission_middleware,
        ));

    Router::new()
        .route("/v1/health", get(health))
        .merge(limited)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(security_headers_middleware))
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    config: Config,
    state: SharedState,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, GateError> {
        let store = Arc::new(Store::connect(config.redis_url()).await);
        let state = Arc::new(AppState::new(&config, store)?);
        Ok(Self { config, state })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(
            addr = %self.config.bind_addr,
            store = %self.state.store.mode(),
            "gatehouse listening"
        );

        let sweeper = spawn_sweeper(self.state.store.clone(), self.config.cleanup_interval());
        let app = create_app(self.state.clone());

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        sweeper.abort();
        self.state.store.close();
        Ok(())
    }
}

/// Periodically drop idle local entries so abandoned identifiers do not
/// accumulate in memory.
fn spawn_sweeper(store: Arc<Store>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(std::time::Duration::from_secs(1)));
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = store.purge_expired();
            if removed > 0 {
                tracing::debug!(target: "gatehouse::store", removed, "purged expired entries");
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
