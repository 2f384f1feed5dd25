//! Upstream conversational-AI API
//!
//! Conversations are created with a plain JSON call; replies arrive as a
//! server-sent-event stream that is relayed token by token.

pub mod client;
pub mod stream;

use serde::{Deserialize, Serialize};

pub use client::{AssistantClient, CompletionHook};
pub use stream::{StreamEvent, parse_event};

/// Body of a streamed message request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chatbot_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_persona: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_source: Option<serde_json::Value>,
    pub prompt: String,
}
