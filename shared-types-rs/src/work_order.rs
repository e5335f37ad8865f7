// shared-types-rs/src/work_order.rs
// Durable work-order record and its lifecycle status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChatEnvelope, Department};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkOrderStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Pending => "Pending",
            WorkOrderStatus::InProgress => "InProgress",
            WorkOrderStatus::Completed => "Completed",
            WorkOrderStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderStatus::Completed | WorkOrderStatus::Failed)
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// A work order before the store has assigned it an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkOrder {
    pub request_id: String,
    pub guest_id: String,
    pub department: Department,
    pub request_text: String,
    pub status: WorkOrderStatus,
    pub timestamps: Timestamps,
}

impl NewWorkOrder {
    /// Pending work order for an envelope, `created == updated == now`
    pub fn from_envelope(envelope: &ChatEnvelope, now: DateTime<Utc>) -> Self {
        Self {
            request_id: envelope.request_id.clone(),
            guest_id: envelope.guest_id.clone(),
            department: envelope.department,
            request_text: envelope.request_text.clone(),
            status: WorkOrderStatus::Pending,
            timestamps: Timestamps {
                created: now,
                updated: now,
            },
        }
    }

    pub fn with_id(self, id: impl Into<String>) -> WorkOrder {
        WorkOrder {
            id: id.into(),
            request_id: self.request_id,
            guest_id: self.guest_id,
            department: self.department,
            request_text: self.request_text,
            status: self.status,
            timestamps: self.timestamps,
        }
    }
}

/// Durable work-order document.
///
/// Stored and served as
/// `{"_id", "requestID", "guestID", "department", "request", "status", "timestamps": {"created", "updated"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "requestID")]
    pub request_id: String,
    #[serde(rename = "guestID")]
    pub guest_id: String,
    pub department: Department,
    #[serde(rename = "request")]
    pub request_text: String,
    pub status: WorkOrderStatus,
    pub timestamps: Timestamps,
}

impl WorkOrder {
    pub fn created_at(&self) -> DateTime<Utc> {
        self.timestamps.created
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.timestamps.updated
    }

    /// Move to `status`, stamping `updated`. `created` never changes.
    pub fn set_status(&mut self, status: WorkOrderStatus, now: DateTime<Utc>) {
        self.status = status;
        self.timestamps.updated = now.max(self.timestamps.created);
    }

    /// True when this snapshot may replace `current` in a projection
    pub fn supersedes(&self, current: &WorkOrder) -> bool {
        self.request_id == current.request_id && self.timestamps.updated >= current.timestamps.updated
    }
}
