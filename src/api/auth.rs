//! Admin API key middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use super::ApiState;
use super::error::{ApiError, error_response};

/// Extract API key from Authorization header
fn extract_api_key(req: &Request) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Require the admin API key on a route
///
/// Admin routes are closed when no key is configured.
pub async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected_key) = &state.api_key else {
        tracing::warn!("LEMONCHAT_API_KEY not configured - admin route disabled");
        return Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized"));
    };

    match extract_api_key(&req) {
        Some(key) if key == expected_key => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "invalid API key provided");
            Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        None => {
            tracing::debug!("no API key provided");
            Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}
