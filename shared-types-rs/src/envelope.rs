// shared-types-rs/src/envelope.rs
// Queue envelope published by the intake gateway.

use serde::{Deserialize, Serialize};

use crate::Department;

/// Errors decoding a queue message body into an envelope
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope is not valid JSON for the expected shape: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("envelope field '{0}' must not be empty")]
    EmptyField(&'static str),
}

/// A classified, correlated guest request. Immutable once published.
///
/// Wire form: `{"requestID", "guestID", "department", "request"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEnvelope {
    #[serde(rename = "requestID")]
    pub request_id: String,
    #[serde(rename = "guestID")]
    pub guest_id: String,
    pub department: Department,
    #[serde(rename = "request")]
    pub request_text: String,
}

impl ChatEnvelope {
    pub fn new(
        request_id: impl Into<String>,
        guest_id: impl Into<String>,
        department: Department,
        request_text: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            guest_id: guest_id.into(),
            department,
            request_text: request_text.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a queue body. A missing or empty `requestID` makes the
    /// message uncorrelatable, so it is treated as malformed.
    pub fn from_slice(body: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: ChatEnvelope = serde_json::from_slice(body)?;
        if envelope.request_id.trim().is_empty() {
            return Err(EnvelopeError::EmptyField("requestID"));
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_field_names() {
        let env = ChatEnvelope::new("1700000000-abcd", "g1", Department::Housekeeping, "I need clean towels");
        let value: serde_json::Value = serde_json::from_slice(&env.to_bytes().unwrap()).unwrap();

        assert_eq!(value["requestID"], "1700000000-abcd");
        assert_eq!(value["guestID"], "g1");
        assert_eq!(value["department"], "Housekeeping");
        assert_eq!(value["request"], "I need clean towels");
        assert_eq!(value.as_object().unwrap().len(), 4);
    }

    #[test]
    fn decodes_producer_json() {
        let body = br#"{"requestID":"r-1","guestID":"g2","department":"Front Desk","request":"late checkout"}"#;
        let env = ChatEnvelope::from_slice(body).unwrap();
        assert_eq!(env.department, Department::FrontDesk);
        assert_eq!(env.request_text, "late checkout");
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(matches!(ChatEnvelope::from_slice(b"not json"), Err(EnvelopeError::Decode(_))));
        assert!(ChatEnvelope::from_slice(br#"{"requestID":"r-1"}"#).is_err());
        assert!(ChatEnvelope::from_slice(
            br#"{"requestID":"r-1","guestID":"g","department":"Spa","request":"x"}"#
        )
        .is_err());
        assert!(matches!(
            ChatEnvelope::from_slice(br#"{"requestID":" ","guestID":"g","department":"IT","request":"x"}"#),
            Err(EnvelopeError::EmptyField("requestID"))
        ));
    }
}
