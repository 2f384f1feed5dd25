//! Billing endpoints: plans, checkout and subscription management

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::ApiState;
use super::auth::require_api_key;
use super::error::{ApiError, api_error};
use super::session::SessionUser;
use crate::billing::display::{
    format_interval, format_price, is_valid_subscription, sort_subscriptions,
    subscription_date_message,
};
use crate::billing::types::SubscriptionUrls;
use crate::db::{Plan, Subscription};

// --- Request/Response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    #[serde(flatten)]
    pub plan: Plan,
    pub formatted_price: String,
    pub formatted_interval: String,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        Self {
            formatted_price: format_price(&plan.price),
            formatted_interval: format_interval(plan.interval.as_deref(), plan.interval_count),
            plan,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub is_valid: bool,
    pub formatted_price: String,
    pub date_message: Option<String>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        Self {
            is_valid: is_valid_subscription(&subscription.status),
            formatted_price: format_price(&subscription.price),
            date_message: subscription_date_message(&subscription, Utc::now()),
            subscription,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub variant_id: i64,
    #[serde(default)]
    pub embed: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePlanRequest {
    pub current_plan_id: String,
    pub new_plan_id: String,
}

// --- Handlers ---

/// Available plans; public
async fn list_plans(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<PlanResponse>>, ApiError> {
    let plans = state.billing.plans().map_err(|e| api_error(&e))?;
    Ok(Json(plans.into_iter().map(PlanResponse::from).collect()))
}

/// Create a checkout for the caller
async fn checkout(
    State(state): State<Arc<ApiState>>,
    user: SessionUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let url = state
        .billing
        .checkout_url(&user.id, user.email.as_deref(), req.variant_id, req.embed)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(CheckoutResponse { url }))
}

/// The caller's subscriptions in display order
async fn list_subscriptions(
    State(state): State<Arc<ApiState>>,
    user: SessionUser,
) -> Result<Json<Vec<SubscriptionResponse>>, ApiError> {
    let mut subs = state
        .billing
        .user_subscriptions(&user.id)
        .map_err(|e| api_error(&e))?;
    sort_subscriptions(&mut subs);
    Ok(Json(subs.into_iter().map(SubscriptionResponse::from).collect()))
}

/// Payment-method and portal links for one subscription
async fn subscription_urls(
    State(state): State<Arc<ApiState>>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionUrls>, ApiError> {
    state
        .billing
        .subscription_urls(&user.id, &id)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

async fn cancel(
    State(state): State<Arc<ApiState>>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<Subscription>, ApiError> {
    state
        .billing
        .cancel(&user.id, &id)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

async fn pause(
    State(state): State<Arc<ApiState>>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<Subscription>, ApiError> {
    state
        .billing
        .pause(&user.id, &id)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

async fn unpause(
    State(state): State<Arc<ApiState>>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<Subscription>, ApiError> {
    state
        .billing
        .unpause(&user.id, &id)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

async fn change_plan(
    State(state): State<Arc<ApiState>>,
    user: SessionUser,
    Json(req): Json<ChangePlanRequest>,
) -> Result<Json<Subscription>, ApiError> {
    state
        .billing
        .change_plan(&user.id, &req.current_plan_id, &req.new_plan_id)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// Pull plans from the store (admin)
async fn sync_plans(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<Plan>>, ApiError> {
    let plans = state.billing.sync_plans().await.map_err(|e| api_error(&e))?;
    tracing::info!(count = plans.len(), "plans synced via API");
    Ok(Json(plans))
}

/// Build billing router
pub fn router(state: Arc<ApiState>) -> Router {
    let admin = Router::new()
        .route("/plans/sync", post(sync_plans))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/plans", get(list_plans))
        .route("/checkout", post(checkout))
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/{id}/urls", get(subscription_urls))
        .route("/subscriptions/{id}/cancel", post(cancel))
        .route("/subscriptions/{id}/pause", post(pause))
        .route("/subscriptions/{id}/unpause", post(unpause))
        .route("/change-plan", post(change_plan))
        .merge(admin)
        .with_state(state)
}
