//! Authenticated session extraction

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::ApiState;
use super::error::{ApiError, api_error, error_response};

/// The signed-in user behind a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: Option<String>,
    pub is_subscriber: bool,
}

/// Extract a Bearer token from the Authorization header
fn extract_bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn unauthorized() -> ApiError {
    error_response(StatusCode::UNAUTHORIZED, "Unauthorized")
}

impl FromRequestParts<Arc<ApiState>> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(keys) = state.session_keys.as_ref() else {
            tracing::warn!("AUTH_SECRET not configured - rejecting session request");
            return Err(unauthorized());
        };

        let token = extract_bearer(parts).ok_or_else(unauthorized)?;
        let claims = keys.validate(token).map_err(|e| {
            tracing::debug!(error = %e, "session token rejected");
            unauthorized()
        })?;

        let is_subscriber = state
            .billing
            .is_subscriber(&claims.sub)
            .map_err(|e| api_error(&e))?;

        Ok(Self {
            id: claims.sub,
            email: claims.email,
            is_subscriber,
        })
    }
}

/// A session that may be absent; never rejects
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<SessionUser>);

impl FromRequestParts<Arc<ApiState>> for MaybeSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        if extract_bearer(parts).is_none() {
            return Ok(Self(None));
        }
        Ok(Self(SessionUser::from_request_parts(parts, state).await.ok()))
    }
}

/// Current session user
async fn get_session(user: SessionUser) -> Json<SessionUser> {
    Json(user)
}

/// Build session router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/session", get(get_session))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};

    use super::*;

    #[test]
    fn bearer_is_extracted() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.headers_mut()
            .insert("authorization", HeaderValue::from_static("Bearer abc.def.ghi"));
        let (parts, _) = req.into_parts();
        assert_eq!(extract_bearer(&parts), Some("abc.def.ghi"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.headers_mut()
            .insert("authorization", HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        let (parts, _) = req.into_parts();
        assert_eq!(extract_bearer(&parts), None);
    }
}
