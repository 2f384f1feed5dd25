//! Lemonchat Gateway - chat relay and subscription billing server
//!
//! This library provides the server half of a subscription chat product:
//! - Streaming relay to a conversational-AI API
//! - Chat transcript history
//! - Plans, checkout and subscriptions via Lemon Squeezy
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Web app                          │
//! └────────────────────┬────────────────────────────────┘
//!                      │ HTTP (session bearer token)
//! ┌────────────────────▼────────────────────────────────┐
//! │                Lemonchat Gateway                    │
//! │   Chat relay  │  Chat history  │  Billing  │  Hooks │
//! └───────┬──────────────┬──────────────┬───────────────┘
//!         │              │              │
//!   Assistant API      SQLite      Lemon Squeezy
//! ```

pub mod api;
pub mod assistant;
pub mod billing;
pub mod config;
pub mod db;
pub mod error;

pub use api::{ApiServer, ApiServerBuilder, ApiState};
pub use assistant::{AssistantClient, MessageRequest};
pub use billing::{BillingService, LemonSqueezyClient, PaymentProvider};
pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
