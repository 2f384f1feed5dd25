//! Webhook endpoints for payment provider callbacks

use std::sync::Arc;

use axum::{Router, routing::post};

use super::ApiState;

pub mod lemonsqueezy;

/// Build webhooks router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/lemonsqueezy", post(lemonsqueezy::handle_event))
        .with_state(state)
}
