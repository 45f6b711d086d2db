use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

/// Header set by the upstream authentication layer
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated reader
///
/// Session handling lives in front of this service; handlers only trust the
/// user id it forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub i64);

impl CurrentUser {
    fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        let raw = raw
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing user id".to_string()))?;
        match raw.parse::<i64>() {
            Ok(user_id) if user_id > 0 => Ok(CurrentUser(user_id)),
            _ => Err(AppError::Unauthorized("invalid user id".to_string())),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok());
        Self::parse(raw)
    }
}
