//! Parsing of the assistant API's streamed message events
//!
//! Each server-sent event carries a JSON payload shaped like
//! `{"status": "progress", "message": "partial text"}`. Only the `message`
//! field is forwarded to the browser.

use serde::Deserialize;

/// What a single upstream event means for the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Forward this text
    Token(String),
    /// Nothing to forward (status-only or empty event)
    Skip,
    /// Upstream signalled the end of the stream
    Done,
    /// Upstream sent an error or an unreadable payload
    Error(String),
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

/// Interpret one SSE `data` payload
#[must_use]
pub fn parse_event(data: &str) -> StreamEvent {
    let data = data.trim();
    if data.is_empty() {
        return StreamEvent::Skip;
    }
    if data == "[DONE]" {
        return StreamEvent::Done;
    }

    let payload: EventPayload = match serde_json::from_str(data) {
        Ok(p) => p,
        Err(e) => return StreamEvent::Error(format!("invalid event payload: {e}")),
    };

    let message = payload.message.and_then(|m| match m {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    });

    if payload.status.as_deref() == Some("error") {
        return StreamEvent::Error(message.unwrap_or_else(|| "upstream reported an error".to_string()));
    }

    match message {
        Some(text) if !text.is_empty() => StreamEvent::Token(text),
        _ => StreamEvent::Skip,
    }
}
