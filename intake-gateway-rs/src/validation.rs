//! Intake Input Validation
//!
//! Request bodies are parsed by hand rather than through the `Json`
//! extractor so every malformed body maps to a `400` with the shared
//! error shape.

use axum::{
    extract::rejection::BytesRejection,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use gateway_auth::error_response;

use crate::service::ChatRequest;

/// Maximum accepted request body (64 KiB)
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ApiValidationError {
    #[error("Invalid request format: {0}")]
    InvalidFormat(String),

    #[error("Content type must be {0}")]
    ContentType(String),

    #[error("Request payload too large: limit is {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl ApiValidationError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidFormat(_) | Self::MissingField(_) => StatusCode::BAD_REQUEST,
            Self::ContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    pub fn from_body_rejection(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(MAX_PAYLOAD_SIZE)
        } else {
            Self::InvalidFormat(rejection.body_text())
        }
    }
}

impl IntoResponse for ApiValidationError {
    fn into_response(self) -> Response {
        error_response(self.status(), self.to_string())
    }
}

/// Validate the Content-Type header
pub fn validate_content_type(headers: &HeaderMap, expected: &str) -> Result<(), ApiValidationError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if !essence.eq_ignore_ascii_case(expected) {
        return Err(ApiValidationError::ContentType(format!(
            "'{}', got '{}'",
            expected, content_type
        )));
    }

    Ok(())
}

/// Parse an intake body: known fields only, `guestID` and `text` present.
/// A blank `text` is accepted; classification then falls back to the
/// transcript or to General.
pub fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, ApiValidationError> {
    if body.len() > MAX_PAYLOAD_SIZE {
        return Err(ApiValidationError::PayloadTooLarge(MAX_PAYLOAD_SIZE));
    }

    serde_json::from_slice(body).map_err(|e| {
        let message = e.to_string();
        match message.strip_prefix("missing field ") {
            Some(field) => ApiValidationError::MissingField(
                field.split(" at ").next().unwrap_or(field).trim_matches('`').to_string(),
            ),
            None => ApiValidationError::InvalidFormat(message),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn accepts_json_content_type_with_charset() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert!(validate_content_type(&headers, "application/json").is_ok());
    }

    #[test]
    fn rejects_other_or_missing_content_type() {
        let mut headers = HeaderMap::new();
        let err = validate_content_type(&headers, "application/json").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(validate_content_type(&headers, "application/json").is_err());
    }

    #[test]
    fn parses_minimal_and_full_bodies() {
        let req = parse_chat_request(br#"{"guestID":"g1","text":"I need clean towels"}"#).unwrap();
        assert_eq!(req.guest_id, "g1");
        assert!(req.voice_transcript.is_none());

        let req = parse_chat_request(br#"{"guestID":"g1","text":"hi","voiceTranscript":"towel"}"#).unwrap();
        assert_eq!(req.voice_transcript.as_deref(), Some("towel"));
    }

    #[test]
    fn unknown_field_is_bad_request() {
        let err = parse_chat_request(br#"{"guestID":"g1","text":"x","room":"101"}"#).unwrap_err();
        assert!(matches!(err, ApiValidationError::InvalidFormat(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_field_is_named() {
        let err = parse_chat_request(br#"{"text":"towels"}"#).unwrap_err();
        match err {
            ApiValidationError::MissingField(field) => assert_eq!(field, "guestID"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn blank_text_is_accepted() {
        let req = parse_chat_request(br#"{"guestID":"g1","text":"   "}"#).unwrap();
        assert_eq!(req.text, "   ");

        let req = parse_chat_request(br#"{"guestID":"g1","text":"","voiceTranscript":"I need clean towels"}"#).unwrap();
        assert!(req.text.is_empty());
        assert_eq!(req.voice_transcript.as_deref(), Some("I need clean towels"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_chat_request(b"not json").is_err());
        assert!(parse_chat_request(b"42").is_err());
    }

    #[test]
    fn oversized_body_is_413() {
        let body = vec![b' '; MAX_PAYLOAD_SIZE + 1];
        assert_eq!(
            parse_chat_request(&body).unwrap_err().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
