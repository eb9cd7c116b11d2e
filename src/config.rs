use envconfig::Envconfig;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config_validator::ConfigValidator;
use crate::error::GateError;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:8000")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL; unset means in-process storage only
    #[envconfig(from = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Default lifetime of cached responses
    #[envconfig(from = "CACHE_TTL_SECONDS", default = "3600")]
    pub cache_ttl_seconds: u64,

    /// Requests admitted per identifier within one window
    #[envconfig(from = "RATE_LIMIT_RPM", default = "60")]
    pub rate_limit_rpm: u64,

    #[envconfig(from = "RATE_LIMIT_WINDOW_SECONDS", default = "60")]
    pub rate_limit_window_seconds: u64,

    #[envconfig(from = "JWT_SECRET", default = "change-me")]
    pub jwt_secret: String,

    #[envconfig(from = "JWT_ALGORITHM", default = "HS256")]
    pub jwt_algorithm: String,

    #[envconfig(from = "JWT_ISSUER", default = "magazine.ai")]
    pub jwt_issuer: String,

    #[envconfig(from = "JWT_AUDIENCE", default = "magazine-users")]
    pub jwt_audience: String,

    #[envconfig(from = "MAX_UPLOAD_MB", default = "10")]
    pub max_upload_mb: usize,

    /// Local store sweep interval in seconds
    #[envconfig(from = "CLEANUP_INTERVAL", default = "300")]
    pub cleanup_interval_secs: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, GateError> {
        let config = Config::init_from_env()
            .map_err(|e| GateError::ConfigurationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GateError> {
        if let Some(url) = self.redis_url() {
            ConfigValidator::validate_redis_url(url)?;
        }
        ConfigValidator::validate_rate_limit(self.rate_limit_rpm, self.rate_limit_window_seconds)?;
        ConfigValidator::validate_cache_ttl(self.cache_ttl_seconds)?;
        ConfigValidator::validate_upload_limit(self.max_upload_mb)?;
        ConfigValidator::validate_signing(&self.jwt_secret, &self.jwt_algorithm)?;
        ConfigValidator::validate_trust_domain(&self.jwt_issuer, &self.jwt_audience)?;
        Ok(())
    }

    /// Configured Redis URL, treating an empty value as absent.
    pub fn redis_url(&self) -> Option<&str> {
        self.redis_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            redis_url: None,
            cache_ttl_seconds: 3600,
            rate_limit_rpm: 60,
            rate_limit_window_seconds: 60,
            jwt_secret: "change-me".to_string(),
            jwt_algorithm: "HS256".to_string(),
            jwt_issuer: "magazine.ai".to_string(),
            jwt_audience: "magazine-users".to_string(),
            max_upload_mb: 10,
            cleanup_interval_secs: 300,
            log_level: "info".to_string(),
        }
    }
}
