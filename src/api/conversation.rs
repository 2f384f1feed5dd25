//! Conversation creation endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use super::ApiState;
use super::error::{ApiError, api_error, error_response};
use super::extract::LooseJson;

/// Create an upstream conversation and return its JSON as-is
async fn create_conversation(
    State(state): State<Arc<ApiState>>,
    body: LooseJson,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(name) = body.str_field("name") else {
        return Err(error_response(StatusCode::BAD_REQUEST, "No Project name included."));
    };

    let conversation = state
        .assistant
        .create_conversation(name)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(conversation))
}

/// Build conversation router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/conversation", post(create_conversation))
        .with_state(state)
}
