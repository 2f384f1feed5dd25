//! HTTP client for the upstream assistant API

use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::stream::{StreamEvent, parse_event};
use super::MessageRequest;
use crate::config::AssistantConfig;
use crate::{Error, Result};

/// Channel depth between the upstream reader and the response body
const TOKEN_BUFFER: usize = 64;

/// Called once with the full reply text when a stream completes
pub type CompletionHook = Box<dyn FnOnce(String) + Send + 'static>;

/// Client for the assistant API
#[derive(Debug, Clone)]
pub struct AssistantClient {
    http: Client,
    base_url: String,
    project_id: String,
    api_key: Option<SecretString>,
}

impl AssistantClient {
    /// Create a client from configuration
    #[must_use]
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.api_url.clone(),
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn conversations_url(&self) -> String {
        format!(
            "{}/projects/{}/conversations",
            self.base_url,
            urlencode(&self.project_id)
        )
    }

    fn messages_url(&self, session_id: &str) -> String {
        format!(
            "{}/{}/messages?stream=true&lang=en",
            self.conversations_url(),
            urlencode(session_id)
        )
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req
            .header("Accept", "application/json")
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => req.bearer_auth(key.expose_secret()),
            None => req,
        }
    }

    /// Create a conversation and return the upstream JSON untouched
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is not JSON
    pub async fn create_conversation(&self, name: &str) -> Result<serde_json::Value> {
        let body = serde_json::json!({ "name": name });
        let response = self
            .authorized(self.http.post(self.conversations_url()))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(%status, "conversation created upstream");

        serde_json::from_str(&text).map_err(|e| {
            Error::Upstream(format!("conversation response was not JSON ({status}): {e}"))
        })
    }

    /// Send a message and relay the streamed reply as text tokens
    ///
    /// The returned stream ends when upstream finishes, fails, or sends a
    /// `[DONE]` marker. `on_completion` runs once with the full reply when
    /// the stream finishes without error and the client stayed connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be turned into an event source
    pub fn stream_message(
        &self,
        session_id: &str,
        request: &MessageRequest,
        on_completion: Option<CompletionHook>,
    ) -> Result<ReceiverStream<String>> {
        let builder = self
            .authorized(self.http.post(self.messages_url(session_id)))
            .json(request);

        let source = builder
            .eventsource()
            .map_err(|e| Error::Upstream(format!("failed to create event source: {e}")))?;

        let (tx, rx) = mpsc::channel(TOKEN_BUFFER);
        let session_id = session_id.to_string();
        tokio::spawn(relay(source, tx, session_id, on_completion));

        Ok(ReceiverStream::new(rx))
    }
}

/// Pump upstream events into the token channel
async fn relay(
    mut source: EventSource,
    tx: mpsc::Sender<String>,
    session_id: String,
    on_completion: Option<CompletionHook>,
) {
    let mut full_text = String::new();
    let mut failed = false;

    while let Some(event) = source.next().await {
        match event {
            Ok(Event::Open) => {
                tracing::info!(session_id = %session_id, "stream started");
            }
            Ok(Event::Message(msg)) => match parse_event(&msg.data) {
                StreamEvent::Token(text) => {
                    tracing::trace!(session_id = %session_id, token = %text, "token received");
                    full_text.push_str(&text);
                    if tx.send(text).await.is_err() {
                        // Client went away
                        tracing::debug!(session_id = %session_id, "client disconnected, closing stream");
                        source.close();
                        return;
                    }
                }
                StreamEvent::Skip => {}
                StreamEvent::Done => break,
                StreamEvent::Error(message) => {
                    tracing::warn!(session_id = %session_id, error = %message, "upstream stream error");
                    failed = true;
                    break;
                }
            },
            Err(reqwest_eventsource::Error::StreamEnded) => break,
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, "upstream transport error");
                failed = true;
                break;
            }
        }
    }

    source.close();

    if failed {
        return;
    }

    tracing::info!(session_id = %session_id, chars = full_text.len(), "stream completed");

    if let Some(hook) = on_completion {
        hook(full_text);
    }
}

fn urlencode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AssistantClient {
        AssistantClient::new(&AssistantConfig {
            api_url: "https://assistant.example/api/v1".to_string(),
            project_id: "4242".to_string(),
            api_key: Some(SecretString::from("k")),
        })
    }

    #[test]
    fn builds_conversation_urls() {
        let c = client();
        assert_eq!(
            c.conversations_url(),
            "https://assistant.example/api/v1/projects/4242/conversations"
        );
        assert_eq!(
            c.messages_url("abc-123"),
            "https://assistant.example/api/v1/projects/4242/conversations/abc-123/messages?stream=true&lang=en"
        );
    }

    #[test]
    fn session_id_is_escaped() {
        let c = client();
        assert!(c.messages_url("a/b").contains("/conversations/a%2Fb/messages"));
    }
}
