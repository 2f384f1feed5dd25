//! HTTP API server for the lemonchat gateway

mod auth;
pub mod billing;
pub mod chat;
pub mod chats;
pub mod conversation;
pub mod error;
pub mod extract;
pub mod health;
pub mod jwt;
pub mod rate_limit;
pub mod session;
pub mod webhooks;

use std::sync::Arc;

use axum::Router;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::assistant::AssistantClient;
use crate::billing::{BillingService, LemonSqueezyClient};
use crate::db::{ChatRepo, DbPool};
use crate::{Config, Result};

pub use error::{ApiError, ErrorResponse};
pub use session::SessionUser;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    /// Admin API key; admin routes are closed without one
    pub api_key: Option<String>,
    /// Session token validation; session routes answer 401 without it
    pub session_keys: Option<jwt::SessionKeys>,
    pub webhook_secret: Option<SecretString>,
    pub assistant: AssistantClient,
    pub chats: ChatRepo,
    pub billing: BillingService,
    pub rate_limiter: Option<rate_limit::SharedLimiter>,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    db: DbPool,
    assistant: AssistantClient,
    billing: BillingService,
    port: u16,
    api_key: Option<String>,
    auth_secret: Option<SecretString>,
    webhook_secret: Option<SecretString>,
    rate_limit: Option<u32>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(db: DbPool, assistant: AssistantClient, billing: BillingService) -> Self {
        Self {
            db,
            assistant,
            billing,
            port: 3001,
            api_key: None,
            auth_secret: None,
            webhook_secret: None,
            rate_limit: None,
        }
    }

    /// Wire the production clients from configuration
    #[must_use]
    pub fn from_config(config: &Config, db: DbPool) -> Self {
        let provider = Arc::new(LemonSqueezyClient::new(&config.lemonsqueezy));
        let billing = BillingService::new(
            provider,
            db.clone(),
            config.server.app_url.clone(),
            config.server.subscriber_cache_secs,
        );

        Self::new(db, AssistantClient::new(&config.assistant), billing)
            .port(config.server.port)
            .api_key(config.server.api_key.clone())
            .auth_secret(config.auth_secret.clone())
            .webhook_secret(config.lemonsqueezy.webhook_secret.clone())
            .rate_limit(config.server.rate_limit)
    }

    /// Set the listening port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the admin API key
    #[must_use]
    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Set the secret session tokens are signed with
    #[must_use]
    pub fn auth_secret(mut self, secret: Option<SecretString>) -> Self {
        self.auth_secret = secret;
        self
    }

    /// Set the webhook signing secret
    #[must_use]
    pub fn webhook_secret(mut self, secret: Option<SecretString>) -> Self {
        self.webhook_secret = secret;
        self
    }

    /// Limit total requests per minute; `None` disables limiting
    #[must_use]
    pub const fn rate_limit(mut self, requests_per_minute: Option<u32>) -> Self {
        self.rate_limit = requests_per_minute;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let state = Arc::new(ApiState {
            chats: ChatRepo::new(self.db.clone()),
            db: self.db,
            api_key: self.api_key,
            session_keys: self.auth_secret.as_ref().map(jwt::SessionKeys::new),
            webhook_secret: self.webhook_secret,
            assistant: self.assistant,
            billing: self.billing,
            rate_limiter: self.rate_limit.map(rate_limit::create_limiter),
        });

        ApiServer {
            state,
            port: self.port,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Shared handler state
    #[must_use]
    pub fn state(&self) -> Arc<ApiState> {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let router = Router::new()
            .merge(chat::router(self.state.clone()))
            .merge(conversation::router(self.state.clone()))
            .merge(chats::router(self.state.clone()))
            .merge(session::router(self.state.clone()))
            .nest("/api/billing", billing::router(self.state.clone()))
            .nest("/api/webhooks", webhooks::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()));

        let router = router.layer(axum::middleware::from_fn_with_state(
            self.state.clone(),
            rate_limit::rate_limit_middleware,
        ));

        // CORS layer for cross-origin requests from the web app
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if self.state.session_keys.is_none() {
            tracing::warn!("AUTH_SECRET not set - session routes will answer 401");
        }
        if self.state.webhook_secret.is_none() {
            tracing::warn!("LEMONSQUEEZY_WEBHOOK_SECRET not set - webhooks will be rejected");
        }

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
