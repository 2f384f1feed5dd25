//! Lemon Squeezy webhook handler
//!
//! Deliveries are signed: `X-Signature` is the hex HMAC-SHA256 of the raw
//! body keyed with the store's webhook secret.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;

use crate::api::ApiState;
use crate::api::error::{ApiError, api_error, error_response};
use crate::billing::types::WebhookEvent;

type HmacSha256 = Hmac<Sha256>;

/// Check a hex signature against the body in constant time
#[must_use]
pub fn verify_signature(secret: &[u8], body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Handle a webhook delivery
pub async fn handle_event(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let Some(secret) = state.webhook_secret.as_ref() else {
        tracing::warn!("LEMONSQUEEZY_WEBHOOK_SECRET not configured - rejecting webhook");
        return Err(error_response(StatusCode::UNAUTHORIZED, "Invalid signature"));
    };

    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !verify_signature(secret.expose_secret().as_bytes(), &body, signature) {
        tracing::warn!("webhook signature mismatch");
        return Err(error_response(StatusCode::UNAUTHORIZED, "Invalid signature"));
    }

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "unreadable webhook payload");
        error_response(StatusCode::BAD_REQUEST, "Invalid payload")
    })?;

    let event_name = event.meta.event_name.clone();
    tracing::info!(event = %event_name, "webhook received");

    state
        .billing
        .apply_webhook(event)
        .map_err(|e| api_error(&e))?;

    Ok(StatusCode::OK)
}
