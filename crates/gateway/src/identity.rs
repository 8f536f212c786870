//! Identity seam for the gateway.
//!
//! Session handling lives in an upstream authenticating proxy; by the time
//! a request reaches this service the caller is already authenticated and
//! identified by the `x-user-id` header. The value is treated as opaque.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated user on whose behalf a request runs.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(|value| CurrentUser(value.to_string()))
            .ok_or_else(|| ApiError::unauthorized("missing x-user-id header"))
    }
}
