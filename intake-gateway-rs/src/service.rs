// intake-gateway-rs/src/service.rs
// Guest request intake: classify, correlate, hand off.

use std::sync::Arc;

use metrics::counter;
use request_router::{new_request_id, RequestClassifier};
use serde::{Deserialize, Serialize};
use shared_types::{ChatEnvelope, Department, EnvelopeError};
use tracing::info;

use crate::dispatcher::{OutboundMessage, PublishDispatcher};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    #[serde(rename = "guestID")]
    pub guest_id: String,
    pub text: String,
    #[serde(rename = "voiceTranscript", default)]
    pub voice_transcript: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAck {
    #[serde(rename = "requestID")]
    pub request_id: String,
    pub status: String,
    pub department: Department,
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] EnvelopeError),
}

pub struct IntakeService {
    classifier: Arc<dyn RequestClassifier>,
    dispatcher: Arc<PublishDispatcher>,
}

impl IntakeService {
    pub fn new(classifier: Arc<dyn RequestClassifier>, dispatcher: Arc<PublishDispatcher>) -> Self {
        Self { classifier, dispatcher }
    }

    /// Accept a guest request and acknowledge it without waiting for the
    /// queue. Publish problems are logged and counted by the dispatcher.
    pub async fn submit(&self, request: ChatRequest) -> Result<ChatAck, IntakeError> {
        let classification_input = match request.voice_transcript.as_deref() {
            Some(transcript) if !transcript.trim().is_empty() => format!("{} {}", request.text, transcript),
            _ => request.text.clone(),
        };
        let department = self.classifier.classify(&classification_input);
        let request_id = new_request_id();

        let envelope = ChatEnvelope::new(request_id.clone(), request.guest_id, department, request.text);
        let body = envelope.to_bytes()?;

        info!(request_id = %request_id, department = %department, "Guest request received");
        counter!("intake.requests", 1, "department" => department.as_str());

        self.dispatcher
            .enqueue(OutboundMessage {
                request_id: request_id.clone(),
                body,
            })
            .await;

        Ok(ChatAck {
            request_id,
            status: "received".to_string(),
            department,
        })
    }
}
