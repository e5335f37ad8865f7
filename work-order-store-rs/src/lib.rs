//! Work Order Store
//!
//! System of record for work orders. Every backend de-duplicates by
//! `requestID`: inserting a second order for a request that is already
//! stored returns the existing order instead of writing a new one.

mod file;
mod memory;

pub use file::{collection_path, FileBackedRepository};
pub use memory::InMemoryRepository;

use async_trait::async_trait;
use error_handling_rs::RetryableError;
use shared_types::{NewWorkOrder, WorkOrder};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl RetryableError for StoreError {
    fn is_transient(&self) -> bool {
        !matches!(self, StoreError::Serde(_))
    }
}

/// Result of an insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(WorkOrder),
    /// An order for this request ID already existed; nothing was written
    Duplicate(WorkOrder),
}

impl InsertOutcome {
    pub fn work_order(&self) -> &WorkOrder {
        match self {
            InsertOutcome::Created(order) | InsertOutcome::Duplicate(order) => order,
        }
    }

    pub fn into_work_order(self) -> WorkOrder {
        match self {
            InsertOutcome::Created(order) | InsertOutcome::Duplicate(order) => order,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, InsertOutcome::Duplicate(_))
    }
}

#[async_trait]
pub trait WorkOrderRepository: Send + Sync {
    /// Assign an `_id` and persist, unless the request ID is already stored
    async fn insert(&self, order: NewWorkOrder) -> Result<InsertOutcome, StoreError>;

    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<WorkOrder>, StoreError>;

    /// Every stored order, oldest first
    async fn list_all(&self) -> Result<Vec<WorkOrder>, StoreError>;
}

pub(crate) fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub(crate) fn sort_oldest_first(orders: &mut [WorkOrder]) {
    orders.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.request_id.cmp(&b.request_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_serde_errors_are_permanent() {
        let io = StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        let serde = StoreError::Serde(serde_json::from_str::<u8>("x").unwrap_err());

        assert!(io.is_transient());
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(!serde.is_transient());
    }

    #[test]
    fn document_ids_are_distinct_hex() {
        let a = new_document_id();
        let b = new_document_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
