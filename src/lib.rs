pub mod auth;
pub mod cache;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod extractors;
pub mod fingerprint;
pub mod handlers;
pub mod key_generator;
pub mod middleware;
pub mod rate_limiter;
pub mod redis;
pub mod response;
pub mod server;
pub mod services;
pub mod store;
pub mod validation;

pub use auth::{Claims, ClaimsGate, Role};
pub use cache::ResponseCache;
pub use config::Config;
pub use error::{GateError, Result};
pub use fingerprint::Fingerprint;
pub use rate_limiter::{Admission, RateLimiter};
pub use server::{create_app, AppState, Server, SharedState};
pub use store::{BackendMode, Store};
