use crate::error::GateError;
use jsonwebtoken::Algorithm;
use std::str::FromStr;

/// Largest accepted `MAX_UPLOAD_MB`.
pub const MAX_UPLOAD_MB: usize = 1024;

/// Validates configuration values before any component is built from them
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), GateError> {
        if url.is_empty() {
            return Err(GateError::ConfigurationError(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(GateError::ConfigurationError(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates rate limit parameters
    pub fn validate_rate_limit(limit: u64, window_seconds: u64) -> Result<(), GateError> {
        if limit == 0 {
            return Err(GateError::ConfigurationError(
                "Rate limit must be greater than 0".to_string(),
            ));
        }

        if window_seconds == 0 {
            return Err(GateError::ConfigurationError(
                "Rate limit window must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_cache_ttl(ttl_seconds: u64) -> Result<(), GateError> {
        if ttl_seconds == 0 {
            return Err(GateError::ConfigurationError(
                "Cache TTL must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Upload limit in megabytes; bounded so the byte count cannot overflow.
    pub fn validate_upload_limit(max_upload_mb: usize) -> Result<(), GateError> {
        if !(1..=MAX_UPLOAD_MB).contains(&max_upload_mb) {
            return Err(GateError::ConfigurationError(format!(
                "Upload limit must be between 1 and {} MB",
                MAX_UPLOAD_MB
            )));
        }
        Ok(())
    }

    /// Validates the token signing secret and algorithm. Only HMAC algorithms
    /// are accepted since the gate signs with a shared secret.
    pub fn validate_signing(secret: &str, algorithm: &str) -> Result<Algorithm, GateError> {
        if secret.is_empty() {
            return Err(GateError::ConfigurationError(
                "JWT secret cannot be empty".to_string(),
            ));
        }

        let algorithm = Algorithm::from_str(algorithm).map_err(|_| {
            GateError::ConfigurationError(format!("Unknown JWT algorithm '{}'", algorithm))
        })?;

        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
            other => Err(GateError::ConfigurationError(format!(
                "JWT algorithm {:?} is not an HMAC algorithm",
                other
            ))),
        }
    }

    pub fn validate_trust_domain(issuer: &str, audience: &str) -> Result<(), GateError> {
        if issuer.trim().is_empty() || audience.trim().is_empty() {
            return Err(GateError::ConfigurationError(
                "JWT issuer and audience must be set".to_string(),
            ));
        }
        Ok(())
    }
}
