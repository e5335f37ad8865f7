// work-order-store-rs/src/memory.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{NewWorkOrder, WorkOrder};
use tokio::sync::RwLock;

use crate::{new_document_id, sort_oldest_first, InsertOutcome, StoreError, WorkOrderRepository};

/// Non-durable repository for tests and single-process runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    orders: Arc<RwLock<HashMap<String, WorkOrder>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl WorkOrderRepository for InMemoryRepository {
    async fn insert(&self, order: NewWorkOrder) -> Result<InsertOutcome, StoreError> {
        let mut orders = self.orders.write().await;
        if let Some(existing) = orders.get(&order.request_id) {
            return Ok(InsertOutcome::Duplicate(existing.clone()));
        }

        let stored = order.with_id(new_document_id());
        orders.insert(stored.request_id.clone(), stored.clone());
        Ok(InsertOutcome::Created(stored))
    }

    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<WorkOrder>, StoreError> {
        Ok(self.orders.read().await.get(request_id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<WorkOrder>, StoreError> {
        let mut all: Vec<WorkOrder> = self.orders.read().await.values().cloned().collect();
        sort_oldest_first(&mut all);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_types::{ChatEnvelope, Department, WorkOrderStatus};

    fn new_order(request_id: &str) -> NewWorkOrder {
        let envelope = ChatEnvelope::new(request_id, "g1", Department::It, "wifi is down");
        NewWorkOrder::from_envelope(&envelope, Utc::now())
    }

    #[tokio::test]
    async fn insert_assigns_id_and_is_findable() {
        let repo = InMemoryRepository::new();
        let outcome = repo.insert(new_order("r-1")).await.unwrap();

        assert!(!outcome.is_duplicate());
        let stored = outcome.work_order();
        assert!(!stored.id.is_empty());
        assert_ne!(stored.id, stored.request_id);
        assert_eq!(stored.status, WorkOrderStatus::Pending);

        let found = repo.find_by_request_id("r-1").await.unwrap().unwrap();
        assert_eq!(&found, stored);
        assert!(repo.find_by_request_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_request_returns_existing() {
        let repo = InMemoryRepository::new();
        let first = repo.insert(new_order("r-1")).await.unwrap().into_work_order();
        let second = repo.insert(new_order("r-1")).await.unwrap();

        assert!(second.is_duplicate());
        assert_eq!(second.work_order(), &first);
        assert_eq!(repo.len().await, 1);
    }
}
