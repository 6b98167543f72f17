use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::auth::StoreError;

/// Message used when a failed response carries nothing readable
pub const FALLBACK_MESSAGE: &str = "Something went wrong";

#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("{message} (status {status})")]
    Status {
        status: StatusCode,
        message: String,
        body: Option<Value>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid authorization header: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),
}

/// Body keys that carry the overall message rather than a field error
const MESSAGE_KEYS: [&str; 2] = ["detail", "message"];

/// Maximum length for messages lifted out of response bodies
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a message to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    fn message_from_body(body: Option<&Value>) -> String {
        let text = body.and_then(|b| {
            MESSAGE_KEYS.iter().find_map(|key| match b.get(*key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Bool(true)) => Some("true".to_string()),
                Some(Value::Number(n)) if n.as_f64() != Some(0.0) => Some(n.to_string()),
                Some(other @ (Value::Array(_) | Value::Object(_))) => Some(other.to_string()),
                // Empty strings, false, 0 and null count as absent.
                _ => None,
            })
        });
        match text {
            Some(text) => Self::truncate_body(&text),
            None => FALLBACK_MESSAGE.to_string(),
        }
    }

    pub fn from_status(status: StatusCode, body: Option<Value>) -> Self {
        let message = Self::message_from_body(body.as_ref());
        ApiError::Status {
            status,
            message,
            body,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            ApiError::Status { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// Field-level messages from an object body, e.g.
    /// `{"email": ["Enter a valid email."]}`.
    pub fn field_errors(&self) -> BTreeMap<String, Vec<String>> {
        let mut fields = BTreeMap::new();
        let Some(Value::Object(map)) = self.body() else {
            return fields;
        };
        for (field, value) in map {
            if MESSAGE_KEYS.contains(&field.as_str()) {
                continue;
            }
            let messages: Vec<String> = match value {
                Value::String(s) if !s.is_empty() => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .filter(|message| !message.is_empty())
                    .collect(),
                _ => continue,
            };
            if !messages.is_empty() {
                fields.insert(field.clone(), messages);
            }
        }
        fields
    }

    /// Text suitable for showing to a user: every field message joined,
    /// or the derived message when the body has none.
    pub fn user_message(&self) -> String {
        let joined = self
            .field_errors()
            .into_values()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() {
            return joined;
        }
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_message_prefers_detail_then_message() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            Some(json!({ "detail": "Bad slug", "message": "ignored" })),
        );
        assert!(matches!(err, ApiError::Status { ref message, .. } if message == "Bad slug"));

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, Some(json!({ "message": "Nope" })));
        assert!(matches!(err, ApiError::Status { ref message, .. } if message == "Nope"));
    }

    #[test]
    fn test_empty_or_falsy_detail_falls_through() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            Some(json!({ "detail": "", "message": "Use this" })),
        );
        assert!(matches!(err, ApiError::Status { ref message, .. } if message == "Use this"));
        assert!(err.field_errors().is_empty());
        assert_eq!(err.user_message(), "Use this");

        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            Some(json!({ "detail": false, "message": 0 })),
        );
        assert!(matches!(err, ApiError::Status { ref message, .. } if message == FALLBACK_MESSAGE));
        assert_eq!(err.user_message(), FALLBACK_MESSAGE);

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, Some(json!({ "detail": 42 })));
        assert!(matches!(err, ApiError::Status { ref message, .. } if message == "42"));
    }

    #[test]
    fn test_fallback_message() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, None);
        assert!(matches!(err, ApiError::Status { ref message, .. } if message == FALLBACK_MESSAGE));

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, Some(json!({ "email": ["taken"] })));
        assert!(matches!(err, ApiError::Status { ref message, .. } if message == FALLBACK_MESSAGE));
    }

    #[test]
    fn test_field_errors_and_user_message() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            Some(json!({
                "email": ["Enter a valid email."],
                "password": "Too short.",
                "extra": null
            })),
        );

        let fields = err.field_errors();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["email"], vec!["Enter a valid email.".to_string()]);
        assert_eq!(err.user_message(), "Enter a valid email. Too short.");
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, Some(json!({ "detail": long })));
        match err {
            ApiError::Status { message, .. } => {
                assert!(message.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
                assert!(message.contains("truncated, 510 total bytes"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_status_helpers() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, None);
        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert!(!ApiError::InvalidResponse("no token".to_string()).is_unauthorized());
    }
}
