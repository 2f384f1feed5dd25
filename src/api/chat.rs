//! Streaming chat relay endpoint

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures::StreamExt;
use serde_json::Value;

use super::ApiState;
use super::error::{ApiError, api_error, error_response};
use super::extract::LooseJson;
use super::session::MaybeSession;
use crate::assistant::{CompletionHook, MessageRequest};
use crate::db::chat::new_chat_id;
use crate::db::{Chat, ChatMessage, ChatRepo};

/// Chat request from the browser
#[derive(Debug)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub custom_persona: Option<String>,
    pub chatbot_model: Option<String>,
    pub response_source: Option<Value>,
    pub session_id: String,
    /// Chat id to save the transcript under
    pub id: Option<String>,
}

impl ChatRequest {
    /// Validate a loosely parsed body; `sessionId` is checked before anything else
    ///
    /// # Errors
    ///
    /// Returns a 400 envelope when the session id or messages are missing or unreadable
    pub fn from_body(body: &LooseJson) -> Result<Self, ApiError> {
        let Some(session_id) = body.str_field("sessionId") else {
            return Err(error_response(StatusCode::BAD_REQUEST, "Session ID not included."));
        };

        let items = body
            .0
            .get("messages")
            .and_then(Value::as_array)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "No messages included."))?;

        let messages = items
            .iter()
            .map(message_from_value)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Invalid message format."))?;

        if messages[0].content.is_empty() {
            return Err(error_response(StatusCode::BAD_REQUEST, "Message content is empty."));
        }

        Ok(Self {
            messages,
            custom_persona: body.str_field("custom_persona").map(str::to_string),
            chatbot_model: body.str_field("chatbot_model").map(str::to_string),
            response_source: body.0.get("response_source").filter(|v| !v.is_null()).cloned(),
            session_id: session_id.to_string(),
            id: body.str_field("id").map(str::to_string),
        })
    }
}

/// Read one message; `content` may be plain text or a list of multimodal parts
fn message_from_value(value: &Value) -> Option<ChatMessage> {
    let object = value.as_object()?;
    let role = object.get("role").and_then(Value::as_str).unwrap_or("user");

    let content = match object.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.as_str()),
                Value::Object(p) if p.get("type").and_then(Value::as_str) == Some("text") => {
                    p.get("text").and_then(Value::as_str)
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None | Some(Value::Null) => String::new(),
        Some(_) => return None,
    };

    let mut message = ChatMessage::new(role, content);
    message.id = object.get("id").and_then(Value::as_str).map(str::to_string);
    Some(message)
}

/// Relay a message to the assistant and stream the reply as plain text
async fn chat(
    State(state): State<Arc<ApiState>>,
    MaybeSession(session): MaybeSession,
    body: LooseJson,
) -> Result<Response, ApiError> {
    let req = ChatRequest::from_body(&body)?;

    let message = MessageRequest {
        chatbot_model: req.chatbot_model,
        custom_persona: req.custom_persona,
        response_source: req.response_source,
        prompt: req.messages[0].content.clone(),
    };

    let on_completion = session.map(|user| {
        let chat_id = transcript_id(&state.chats, req.id, &user.id);
        save_transcript_hook(state.chats.clone(), chat_id, user.id, req.messages)
    });

    tracing::debug!(session_id = %req.session_id, "relaying chat message");
    let tokens = state
        .assistant
        .stream_message(&req.session_id, &message, on_completion)
        .map_err(|e| api_error(&e))?;

    let body = Body::from_stream(tokens.map(Ok::<_, Infallible>));
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}

/// Id to save a transcript under
///
/// A requested id already owned by someone else is replaced with a fresh one.
fn transcript_id(chats: &ChatRepo, requested: Option<String>, user_id: &str) -> String {
    let Some(id) = requested else {
        return new_chat_id();
    };

    match chats.owner(&id) {
        Ok(Some(owner)) if owner != user_id => {
            tracing::warn!(chat_id = %id, user_id, "requested chat id belongs to another user, saving under a new id");
            new_chat_id()
        }
        Ok(_) => id,
        Err(e) => {
            tracing::warn!(chat_id = %id, error = %e, "failed to look up chat owner, saving under a new id");
            new_chat_id()
        }
    }
}

/// Persist the transcript with the assistant's reply once the stream completes
fn save_transcript_hook(
    chats: ChatRepo,
    chat_id: String,
    user_id: String,
    mut messages: Vec<ChatMessage>,
) -> CompletionHook {
    Box::new(move |reply| {
        let created_at = match chats.get_chat(&chat_id, &user_id) {
            Ok(Some(existing)) => existing.created_at,
            _ => chrono::Utc::now().timestamp_millis(),
        };

        messages.push(ChatMessage::new("assistant", reply));
        let chat = Chat::new(chat_id, user_id, messages, created_at);

        match chats.save_chat(&chat) {
            Ok(()) => tracing::debug!(chat_id = %chat.id, user_id = %chat.user_id, "transcript saved"),
            Err(e) => tracing::error!(chat_id = %chat.id, error = %e, "failed to save transcript"),
        }
    })
}

/// Build chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use serde_json::json;

    use crate::db::init_memory;

    fn parse(body: Value) -> Result<ChatRequest, ApiError> {
        ChatRequest::from_body(&LooseJson(body))
    }

    fn rejection_message(result: Result<ChatRequest, ApiError>) -> (StatusCode, String) {
        let (status, Json(body)) = result.unwrap_err();
        (status, body.data.message)
    }

    #[test]
    fn request_accepts_browser_field_names() {
        let req = parse(json!({
            "messages": [{"role": "user", "content": "hello"}],
            "custom_persona": "pirate",
            "chatbot_model": "gpt-4",
            "response_source": "default",
            "sessionId": "abc"
        }))
        .unwrap();
        assert_eq!(req.session_id, "abc");
        assert_eq!(req.messages[0].content, "hello");
        assert_eq!(req.chatbot_model.as_deref(), Some("gpt-4"));
        assert_eq!(req.response_source, Some(json!("default")));
        assert!(req.id.is_none());
    }

    #[test]
    fn session_id_is_checked_before_messages() {
        for body in [
            json!({ "messages": [{ "role": "user" }] }),
            json!({ "messages": "hi" }),
            json!({ "messages": [{ "role": "user", "content": [{ "type": "text", "text": "hi" }] }] }),
            Value::Null,
        ] {
            assert_eq!(
                rejection_message(parse(body)),
                (StatusCode::BAD_REQUEST, "Session ID not included.".to_string())
            );
        }
    }

    #[test]
    fn malformed_messages_are_bad_requests() {
        let cases = [
            (json!({ "sessionId": "s", "messages": "hi" }), "No messages included."),
            (json!({ "sessionId": "s", "messages": [] }), "No messages included."),
            (json!({ "sessionId": "s", "messages": ["hi"] }), "Invalid message format."),
            (json!({ "sessionId": "s", "messages": [{ "content": 5 }] }), "Invalid message format."),
            (json!({ "sessionId": "s", "messages": [{ "role": "user" }] }), "Message content is empty."),
        ];
        for (body, message) in cases {
            assert_eq!(
                rejection_message(parse(body)),
                (StatusCode::BAD_REQUEST, message.to_string())
            );
        }
    }

    #[test]
    fn multimodal_content_keeps_text_parts() {
        let req = parse(json!({
            "sessionId": "s",
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "Describe this" },
                    { "type": "image_url", "image_url": { "url": "https://img.example/a.png" } },
                    { "type": "text", "text": "briefly" }
                ]
            }]
        }))
        .unwrap();
        assert_eq!(req.messages[0].content, "Describe this\nbriefly");
    }

    #[test]
    fn foreign_chat_id_is_not_reused() {
        let chats = ChatRepo::new(init_memory().unwrap());
        chats
            .save_chat(&Chat::new(
                "abc1234".to_string(),
                "alice".to_string(),
                vec![ChatMessage::new("user", "mine")],
                1,
            ))
            .unwrap();

        assert_eq!(transcript_id(&chats, Some("abc1234".to_string()), "alice"), "abc1234");
        assert_eq!(transcript_id(&chats, Some("new0001".to_string()), "mallory"), "new0001");

        let replaced = transcript_id(&chats, Some("abc1234".to_string()), "mallory");
        assert_ne!(replaced, "abc1234");
        assert_eq!(replaced.len(), 7);
    }

    #[test]
    fn hook_saves_transcript_with_reply() {
        let chats = ChatRepo::new(init_memory().unwrap());
        let hook = save_transcript_hook(
            chats.clone(),
            "abc1234".to_string(),
            "u1".to_string(),
            vec![ChatMessage::new("user", "What is Rust?")],
        );
        hook("A language.".to_string());

        let chat = chats.get_chat("abc1234", "u1").unwrap().unwrap();
        assert_eq!(chat.title, "What is Rust?");
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[1].role, "assistant");
        assert_eq!(chat.messages[1].content, "A language.");
        assert_eq!(chats.get_chats(Some("u1")).len(), 1);
    }
}
