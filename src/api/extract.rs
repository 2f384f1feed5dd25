//! Request body extraction that leaves validation to the handler

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use serde_json::Value;

use super::error::{ApiError, error_response};

/// A request body read as loosely typed JSON
///
/// Unlike `Json`, the content type is not checked and an unparseable body
/// becomes `Value::Null`, so handlers answer with their own error envelope.
#[derive(Debug, Clone)]
pub struct LooseJson(pub Value);

impl LooseJson {
    /// Non-empty string field, if present
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

impl<S> FromRequest<S> for LooseJson
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| error_response(e.status(), &e.body_text()))?;

        let value = serde_json::from_slice(&body).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "request body is not JSON");
            Value::Null
        });

        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    async fn extract(body: &'static str) -> LooseJson {
        let req = Request::builder().body(Body::from(body)).unwrap();
        LooseJson::from_request(req, &()).await.unwrap()
    }

    #[tokio::test]
    async fn parses_json_without_content_type() {
        let body = extract(r#"{"sessionId": "s-1", "n": 3}"#).await;
        assert_eq!(body.str_field("sessionId"), Some("s-1"));
        assert_eq!(body.str_field("n"), None);
        assert_eq!(body.str_field("missing"), None);
    }

    #[tokio::test]
    async fn garbage_becomes_null() {
        let body = extract("not json").await;
        assert!(body.0.is_null());
        assert_eq!(body.str_field("sessionId"), None);
    }
}
