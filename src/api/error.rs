//! JSON error envelope shared by every endpoint
//!
//! ```json
//! { "data": { "message": "Session ID not included.", "code": 400 }, "status": "error" }
//! ```

use axum::Json;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub data: ErrorDetail,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub code: u16,
}

/// Handler error type
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Build an error envelope with the given status
pub fn error_response(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            data: ErrorDetail {
                message: message.to_string(),
                code: status.as_u16(),
            },
            status: "error".to_string(),
        }),
    )
}

/// Map a crate error onto the envelope
///
/// Server-side failures are logged and their detail withheld from the body.
pub fn api_error(err: &Error) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match err {
        Error::NotFound(msg) | Error::InvalidInput(msg) | Error::Unauthorized(msg) => {
            tracing::debug!(status = status.as_u16(), error = %err, "request rejected");
            error_response(status, msg)
        }
        Error::Billing(_) | Error::Upstream(_) | Error::Http(_) => {
            tracing::warn!(error = %err, "upstream call failed");
            error_response(status, &err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "request failed");
            error_response(status, "Internal server error")
        }
    }
}
