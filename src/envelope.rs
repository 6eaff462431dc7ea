use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::authz::Identity;

/// Marker extension set by responses whose body is already an envelope, so
/// the terminal writer only injects the session view instead of wrapping
/// twice.
#[derive(Debug, Clone, Copy)]
pub struct Enveloped;

/// The uniform response body: every success and every failure goes out in
/// this shape.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub status: u16,
    pub success: bool,
    pub message: String,
    pub data: Value,
    pub session: Value,
}

impl Envelope {
    pub fn ok(status: StatusCode, data: Value) -> Self {
        Self {
            status: status.as_u16(),
            success: true,
            message: status
                .canonical_reason()
                .unwrap_or("success")
                .to_string(),
            data,
            session: Value::Null,
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            success: false,
            message: message.into(),
            data: Value::Null,
            session: Value::Null,
        }
    }

    pub fn with_session(mut self, identity: Option<&Identity>) -> Self {
        self.session = session_value(identity);
        self
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self)).into_response();
        response.extensions_mut().insert(Enveloped);
        response
    }
}

fn session_value(identity: Option<&Identity>) -> Value {
    identity
        .map(|id| serde_json::to_value(id).unwrap_or(Value::Null))
        .unwrap_or(Value::Null)
}

/// Terminal translator: turns whatever the inner stack produced into the
/// envelope shape, stamping the resolved identity into `session`.
///
/// Three inputs are possible here: an already-enveloped body (errors raised
/// through `AppError`, or guard denials), a plain handler body (wrapped as
/// `data`), and bare framework responses such as axum's 404/405 fallbacks
/// (wrapped with the canonical reason as the message).
pub async fn finalize_response(response: Response, identity: Option<&Identity>) -> Response {
    let (parts, body) = response.into_parts();
    let status = parts.status;

    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(error = %err, "failed to buffer response body");
            return Envelope::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error: response body unavailable",
            )
            .with_session(identity)
            .into_response();
        }
    };

    if parts.extensions.get::<Enveloped>().is_some() {
        // Re-stamp the session; the rest of the envelope is authoritative.
        let mut value: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.insert("session".to_string(), session_value(identity));
        }
        return (status, Json(value)).into_response();
    }

    let envelope = if status.is_success() {
        let data = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Envelope::ok(status, data)
    } else {
        let message = status
            .canonical_reason()
            .unwrap_or("error")
            .to_lowercase();
        Envelope::error(status, message)
    };

    let envelope = envelope.with_session(identity);
    (status, Json(envelope)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_success_body_is_wrapped_as_data() {
        let inner = (StatusCode::OK, Json(serde_json::json!({"id": 7}))).into_response();
        let finalized = finalize_response(inner, None).await;
        assert_eq!(finalized.status(), StatusCode::OK);

        let bytes = to_bytes(finalized.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], 200);
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["id"], 7);
        assert!(value["session"].is_null());
    }

    #[tokio::test]
    async fn bare_framework_errors_become_envelopes() {
        let inner = StatusCode::METHOD_NOT_ALLOWED.into_response();
        let finalized = finalize_response(inner, None).await;
        assert_eq!(finalized.status(), StatusCode::METHOD_NOT_ALLOWED);

        let bytes = to_bytes(finalized.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], 405);
        assert_eq!(value["success"], false);
        assert!(value["data"].is_null());
    }

    #[tokio::test]
    async fn enveloped_bodies_are_not_wrapped_twice() {
        let inner = Envelope::error(StatusCode::GONE, "session gone").into_response();
        let finalized = finalize_response(inner, None).await;
        assert_eq!(finalized.status(), StatusCode::GONE);

        let bytes = to_bytes(finalized.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], 410);
        assert_eq!(value["message"], "session gone");
        // no nested envelope
        assert!(value["data"].is_null());
    }
}
