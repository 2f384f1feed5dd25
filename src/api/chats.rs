//! Chat history endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use super::ApiState;
use super::error::{ApiError, api_error, error_response};
use super::session::SessionUser;
use crate::db::Chat;

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub cleared: usize,
}

/// The caller's chats, most recent first
async fn list_chats(State(state): State<Arc<ApiState>>, user: SessionUser) -> Json<Vec<Chat>> {
    Json(state.chats.get_chats(Some(&user.id)))
}

/// One of the caller's chats
async fn get_chat(
    State(state): State<Arc<ApiState>>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<Chat>, ApiError> {
    state
        .chats
        .get_chat(&id, &user.id)
        .map_err(|e| api_error(&e))?
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Chat not found"))
}

/// Delete one of the caller's chats
async fn remove_chat(
    State(state): State<Arc<ApiState>>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .chats
        .remove_chat(&id, &user.id)
        .map_err(|e| api_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete all of the caller's chats
async fn clear_chats(
    State(state): State<Arc<ApiState>>,
    user: SessionUser,
) -> Result<Json<ClearedResponse>, ApiError> {
    let cleared = state
        .chats
        .clear_chats(&user.id)
        .map_err(|e| api_error(&e))?;
    Ok(Json(ClearedResponse { cleared }))
}

/// Publish one of the caller's chats
async fn share_chat(
    State(state): State<Arc<ApiState>>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<Chat>, ApiError> {
    state
        .chats
        .share_chat(&id, &user.id)
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// A shared chat; no session required
async fn get_shared_chat(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Chat>, ApiError> {
    state
        .chats
        .get_shared_chat(&id)
        .map_err(|e| api_error(&e))?
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Chat not found"))
}

/// Build chats router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/chats", get(list_chats).delete(clear_chats))
        .route("/api/chats/{id}", get(get_chat).delete(remove_chat))
        .route("/api/chats/{id}/share", post(share_chat))
        .route("/api/share/{id}", get(get_shared_chat))
        .with_state(state)
}
