//! Billing and webhook endpoint integration tests

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use lemonchat_gateway::db::{PlanRepo, SubscriptionRepo};
use serde_json::json;
use sha2::Sha256;

mod common;
use common::{ADMIN_KEY, TestApp, WEBHOOK_SECRET, empty_request, json_request};

fn webhook_body(event: &str, subscription_id: &str, user_id: &str, variant_id: i64) -> String {
    json!({
        "meta": { "event_name": event, "custom_data": { "user_id": user_id } },
        "data": {
            "type": "subscriptions",
            "id": subscription_id,
            "attributes": {
                "order_id": 1,
                "variant_id": variant_id,
                "user_name": "Alice",
                "user_email": "alice@example.com",
                "status": "active",
                "status_formatted": "Active",
                "renews_at": "2099-01-01T00:00:00.000000Z",
                "ends_at": null,
                "trial_ends_at": null,
                "pause": null,
                "first_subscription_item": { "id": 5, "is_usage_based": false }
            }
        }
    })
    .to_string()
}

fn signed_webhook(body: &str, secret: &str) -> Request<Body> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/webhooks/lemonsqueezy")
        .header("content-type", "application/json")
        .header("x-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_sync_request(key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/api/billing/plans/sync");
    if let Some(key) = key {
        builder = builder.header("authorization", format!("Bearer {key}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// Sync the fake store's single plan and subscribe `user_id` to it
async fn subscribed_app(user_id: &str) -> TestApp {
    let app = TestApp::offline();
    app.billing.sync_plans().await.unwrap();
    let (status, _) = app
        .send(signed_webhook(&webhook_body("subscription_created", "sub_1", user_id, 100), WEBHOOK_SECRET))
        .await;
    assert_eq!(status, StatusCode::OK);
    app
}

#[tokio::test]
async fn plan_sync_requires_admin_key() {
    let app = TestApp::offline();

    let (status, _) = app.send(admin_sync_request(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(admin_sync_request(Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.send_json(admin_sync_request(Some(ADMIN_KEY))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["variantId"], 100);
}

#[tokio::test]
async fn plans_are_public_and_formatted() {
    let app = TestApp::offline();
    app.billing.sync_plans().await.unwrap();

    let (status, body) = app.send_json(empty_request("GET", "/api/billing/plans", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Monthly");
    assert_eq!(body[0]["productName"], "Assistant");
    assert_eq!(body[0]["formattedPrice"], "$9.99");
    assert_eq!(body[0]["formattedInterval"], "month");
}

#[tokio::test]
async fn checkout_returns_provider_url() {
    let app = TestApp::offline();
    let (status, body) = app
        .send_json(json_request(
            "POST",
            "/api/billing/checkout",
            Some("alice"),
            &json!({ "variantId": 100, "embed": true }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://pay.example/checkout/100");
    assert_eq!(app.provider.calls(), ["checkout:100"]);
}

#[tokio::test]
async fn checkout_requires_session() {
    let app = TestApp::offline();
    let (status, _) = app
        .send_json(json_request("POST", "/api/billing/checkout", None, &json!({ "variantId": 100 })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let app = TestApp::offline();
    let body = webhook_body("subscription_created", "sub_1", "alice", 100);

    let (status, _) = app.send(signed_webhook(&body, "not-the-secret")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let unsigned = Request::builder()
        .method("POST")
        .uri("/api/webhooks/lemonsqueezy")
        .body(Body::from(body))
        .unwrap();
    let (status, _) = app.send(unsigned).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(SubscriptionRepo::new(app.db.clone()).list_for_user("alice").unwrap().is_empty());
}

#[tokio::test]
async fn webhook_creates_subscription_and_grants_access() {
    let app = subscribed_app("alice").await;

    let (status, body) = app
        .send_json(empty_request("GET", "/api/billing/subscriptions", Some("alice")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["lemonSqueezyId"], "sub_1");
    assert_eq!(body[0]["isValid"], true);
    assert_eq!(body[0]["formattedPrice"], "$9.99");
    assert_eq!(body[0]["dateMessage"], "Renews on January 1, 2099");

    let (_, session) = app.send_json(empty_request("GET", "/api/session", Some("alice"))).await;
    assert_eq!(session["isSubscriber"], true);
}

#[tokio::test]
async fn unrelated_webhook_is_acknowledged() {
    let app = TestApp::offline();
    let body = json!({
        "meta": { "event_name": "order_created" },
        "data": { "type": "orders", "id": "1", "attributes": {} }
    })
    .to_string();

    let (status, _) = app.send(signed_webhook(&body, WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cancelling_someone_elses_subscription_fails() {
    let app = subscribed_app("alice").await;

    let (status, body) = app
        .send_json(empty_request("POST", "/api/billing/subscriptions/sub_1/cancel", Some("mallory")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["message"], "Subscription #sub_1 not found.");
    assert!(app.provider.calls().is_empty());
}

#[tokio::test]
async fn cancel_pause_and_unpause() {
    let app = subscribed_app("alice").await;

    let (status, body) = app
        .send_json(empty_request("POST", "/api/billing/subscriptions/sub_1/pause", Some("alice")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isPaused"], true);

    let (_, session) = app.send_json(empty_request("GET", "/api/session", Some("alice"))).await;
    assert_eq!(session["isSubscriber"], false);

    let (_, body) = app
        .send_json(empty_request("POST", "/api/billing/subscriptions/sub_1/unpause", Some("alice")))
        .await;
    assert_eq!(body["isPaused"], false);

    let (status, body) = app
        .send_json(empty_request("POST", "/api/billing/subscriptions/sub_1/cancel", Some("alice")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert!(body["endsAt"].is_string());

    assert_eq!(app.provider.calls(), ["update:sub_1", "update:sub_1", "cancel:sub_1"]);
}

#[tokio::test]
async fn subscription_urls_come_from_provider() {
    let app = subscribed_app("alice").await;

    let (status, body) = app
        .send_json(empty_request("GET", "/api/billing/subscriptions/sub_1/urls", Some("alice")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["customer_portal"], "https://pay.example/portal/sub_1");
}

#[tokio::test]
async fn change_plan_with_unknown_plan_fails() {
    let app = subscribed_app("alice").await;
    let plan_id = PlanRepo::new(app.db.clone()).find_by_variant(100).unwrap().unwrap().id;

    let (status, body) = app
        .send_json(json_request(
            "POST",
            "/api/billing/change-plan",
            Some("alice"),
            &json!({ "currentPlanId": plan_id, "newPlanId": "missing" }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["message"], "No plan with plan id #missing was found.");
}
