use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::auth::{bearer_token, Claims};
use crate::error::GateError;
use crate::server::SharedState;

/// Caller with a valid token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

/// Caller with a valid token carrying admin rights.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Claims);

#[async_trait]
impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = GateError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(GateError::Unauthorized)?;

        state.gate.validate(token).map(AuthUser)
    }
}

#[async_trait]
impl FromRequestParts<SharedState> for AdminUser {
    type Rejection = GateError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        state.gate.require_admin(claims).map(AdminUser)
    }
}
