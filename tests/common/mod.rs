//! Shared test utilities
#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Path;
use axum::http::{Request, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::SecretString;
use tower::ServiceExt;

use lemonchat_gateway::api::jwt::{SessionClaims, issue_token};
use lemonchat_gateway::billing::types::{
    CheckoutRequest, PriceAttributes, ProductAttributes, Resource, SubscriptionAttributes,
    SubscriptionPatch, VariantAttributes,
};
use lemonchat_gateway::config::AssistantConfig;
use lemonchat_gateway::{
    ApiServerBuilder, AssistantClient, BillingService, DbPool, PaymentProvider, Result, db,
};

pub const AUTH_SECRET: &str = "test-auth-secret";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Mint a session token for a user
#[must_use]
pub fn token_for(user_id: &str) -> String {
    let exp = u64::try_from(chrono::Utc::now().timestamp()).unwrap() + 3600;
    issue_token(
        &SecretString::from(AUTH_SECRET),
        &SessionClaims {
            sub: user_id.to_string(),
            email: Some(format!("{user_id}@example.com")),
            exp,
        },
    )
    .expect("failed to sign token")
}

/// Payment provider that records calls and answers with canned data
#[derive(Default)]
pub struct FakeProvider {
    pub calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn subscription(status: &str) -> SubscriptionAttributes {
        SubscriptionAttributes {
            status: status.to_string(),
            status_formatted: status.to_string(),
            ..SubscriptionAttributes::default()
        }
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<String> {
        self.calls.lock().unwrap().push(format!("checkout:{}", request.variant_id));
        Ok(format!("https://pay.example/checkout/{}", request.variant_id))
    }

    async fn get_subscription(&self, id: &str) -> Result<SubscriptionAttributes> {
        self.calls.lock().unwrap().push(format!("get:{id}"));
        let mut attrs = Self::subscription("active");
        attrs.urls.customer_portal = Some(format!("https://pay.example/portal/{id}"));
        Ok(attrs)
    }

    async fn cancel_subscription(&self, id: &str) -> Result<SubscriptionAttributes> {
        self.calls.lock().unwrap().push(format!("cancel:{id}"));
        Ok(Self::subscription("cancelled"))
    }

    async fn update_subscription(
        &self,
        id: &str,
        patch: SubscriptionPatch,
    ) -> Result<SubscriptionAttributes> {
        self.calls.lock().unwrap().push(format!("update:{id}"));
        Ok(match patch {
            SubscriptionPatch::Pause => {
                let mut attrs = Self::subscription("paused");
                attrs.pause = Some(serde_json::json!({ "mode": "void" }));
                attrs
            }
            _ => Self::subscription("active"),
        })
    }

    async fn list_variants(&self) -> Result<Vec<Resource<VariantAttributes>>> {
        Ok(vec![Resource {
            id: "100".to_string(),
            kind: "variants".to_string(),
            attributes: VariantAttributes {
                product_id: 1,
                name: "Monthly".to_string(),
                description: None,
                status: "published".to_string(),
                sort: Some(1),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            },
        }])
    }

    async fn get_product(&self, _product_id: i64) -> Result<ProductAttributes> {
        Ok(ProductAttributes {
            name: "Assistant".to_string(),
        })
    }

    async fn first_price(&self, _variant_id: &str) -> Result<Option<PriceAttributes>> {
        Ok(Some(PriceAttributes {
            category: Some("subscription".to_string()),
            unit_price: Some(999),
            renewal_interval_unit: Some("month".to_string()),
            renewal_interval_quantity: Some(1),
            ..PriceAttributes::default()
        }))
    }
}

/// A fully wired app for endpoint tests
pub struct TestApp {
    pub db: DbPool,
    pub router: Router,
    pub provider: Arc<FakeProvider>,
    pub billing: BillingService,
}

impl TestApp {
    /// Build an app whose assistant calls go to `assistant_url`
    pub fn new(assistant_url: &str) -> Self {
        let db = setup_test_db();
        let provider = Arc::new(FakeProvider::default());
        let billing = BillingService::new(provider.clone(), db.clone(), "https://chat.example", 60);
        let assistant = AssistantClient::new(&AssistantConfig {
            api_url: assistant_url.to_string(),
            project_id: "42".to_string(),
            api_key: Some(SecretString::from("assistant-key")),
        });

        let server = ApiServerBuilder::new(db.clone(), assistant, billing.clone())
            .api_key(Some(ADMIN_KEY.to_string()))
            .auth_secret(Some(SecretString::from(AUTH_SECRET)))
            .webhook_secret(Some(SecretString::from(WEBHOOK_SECRET)))
            .build();

        Self {
            db,
            router: server.router(),
            provider,
            billing,
        }
    }

    /// An app whose assistant URL points nowhere
    pub fn offline() -> Self {
        Self::new("http://127.0.0.1:9")
    }

    /// Send a request and return status plus body bytes
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    /// Send a request and parse the body as JSON
    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, body) = self.send(request).await;
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }
}

/// Build a JSON request, optionally signed in as `user`
pub fn json_request(
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: &serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("authorization", format!("Bearer {}", token_for(user)));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Build a body-less request, optionally signed in as `user`
pub fn empty_request(method: &str, uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("authorization", format!("Bearer {}", token_for(user)));
    }
    builder.body(Body::empty()).unwrap()
}

async fn stub_create_conversation(
    Path(project): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "success",
        "data": {
            "project_id": project,
            "session_id": "session-1",
            "name": body["name"],
        }
    }))
}

/// Session id the stub answers with HTTP 500
pub const BROKEN_SESSION: &str = "broken";

/// Prompt the stub answers with one token followed by an error event
pub const FAILING_PROMPT: &str = "fail please";

async fn stub_stream_message(
    Path((_project, session)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if session == BROKEN_SESSION {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }

    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    if prompt == FAILING_PROMPT {
        let events = vec![
            Event::default().data(serde_json::json!({ "status": "progress", "message": "partial" }).to_string()),
            Event::default().data(r#"{"status":"error","message":"model overloaded"}"#),
            Event::default().data(serde_json::json!({ "status": "progress", "message": " never sent" }).to_string()),
            Event::default().data("[DONE]"),
        ];
        return Sse::new(futures::stream::iter(events.into_iter().map(Ok::<_, Infallible>))).into_response();
    }

    let events = vec![
        Event::default().data(r#"{"status":"start"}"#),
        Event::default().data(serde_json::json!({ "status": "progress", "message": "Echo: " }).to_string()),
        Event::default().data(serde_json::json!({ "status": "progress", "message": prompt }).to_string()),
        Event::default().data(serde_json::json!({ "status": "progress", "message": "" }).to_string()),
        Event::default().data(serde_json::json!({ "status": "progress", "message": format!(" ({session})") }).to_string()),
        Event::default().data(r#"{"status":"finish","citations":[]}"#),
        Event::default().data("[DONE]"),
    ];
    Sse::new(futures::stream::iter(events.into_iter().map(Ok::<_, Infallible>))).into_response()
}

/// Start a local stand-in for the assistant API and return its base URL
pub async fn spawn_assistant_stub() -> String {
    let app = Router::new()
        .route("/projects/{project}/conversations", post(stub_create_conversation))
        .route(
            "/projects/{project}/conversations/{session}/messages",
            post(stub_stream_message),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}
