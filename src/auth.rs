//! Token issuance and validation.
//!
//! Tokens are HMAC-signed JWTs carrying `iss`/`aud` for the configured trust
//! domain. Validation collapses every failure into [`GateError::Unauthorized`];
//! the underlying reason is only logged.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::config_validator::ConfigValidator;
use crate::error::{GateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub role: Role,
    /// Mirrors `role` on issuance. Older tokens may carry only one of the two.
    #[serde(default)]
    pub admin: bool,
}

impl Claims {
    /// Either signal grants admin rights.
    pub fn is_admin(&self) -> bool {
        self.admin || self.role == Role::Admin
    }
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub secret: String,
    pub algorithm: Algorithm,
    pub issuer: String,
    pub audience: String,
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let algorithm =
            ConfigValidator::validate_signing(&config.jwt_secret, &config.jwt_algorithm)?;
        ConfigValidator::validate_trust_domain(&config.jwt_issuer, &config.jwt_audience)?;
        Ok(Self {
            secret: config.jwt_secret.clone(),
            algorithm,
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
        })
    }
}

pub struct ClaimsGate {
    settings: AuthSettings,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl ClaimsGate {
    pub fn new(settings: AuthSettings) -> Self {
        let mut validation = Validation::new(settings.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(AuthSettings::from_config(config)?))
    }

    /// Sign a token for `subject` valid for `ttl_minutes`. A non-positive TTL
    /// yields a token that is already expired.
    pub fn issue(&self, subject: &str, ttl_minutes: i64, is_admin: bool) -> Result<String> {
        let now = unix_seconds();
        let claims = Claims {
            sub: subject.to_string(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            iat: now,
            exp: now.saturating_add(ttl_minutes.saturating_mul(60)),
            role: if is_admin { Role::Admin } else { Role::User },
            admin: is_admin,
        };

        encode(&Header::new(self.settings.algorithm), &claims, &self.encoding_key)
            .map_err(|e| GateError::Internal(format!("Failed to sign token: {}", e)))
    }

    pub fn validate(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(target: "gatehouse::auth", reason = ?e.kind(), "token rejected");
                GateError::Unauthorized
            })
    }

    pub fn require_admin(&self, claims: Claims) -> Result<Claims> {
        if claims.is_admin() {
            Ok(claims)
        } else {
            tracing::info!(target: "gatehouse::auth", subject = %claims.sub, "admin required");
            Err(GateError::Forbidden)
        }
    }
}

/// Strip the `Bearer ` scheme from an Authorization header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
