// work-order-service-rs/src/projection.rs
// In-memory status projection: request ID -> latest work-order snapshot.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shared_types::WorkOrder;
use tracing::{debug, info};
use work_order_store::{StoreError, WorkOrderRepository};

/// Read cache of work-order state. Not the system of record: a miss is a
/// normal outcome even for persisted requests.
pub trait StatusProjection: Send + Sync {
    fn get(&self, request_id: &str) -> Option<Arc<WorkOrder>>;

    /// Install `order` unless the current entry is newer. Returns whether
    /// the entry changed.
    fn upsert(&self, order: WorkOrder) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sharded projection; readers of different shards never contend and a
/// writer holds only its own shard.
#[derive(Debug, Default)]
pub struct DashMapProjection {
    entries: DashMap<String, Arc<WorkOrder>>,
}

impl DashMapProjection {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusProjection for DashMapProjection {
    fn get(&self, request_id: &str) -> Option<Arc<WorkOrder>> {
        self.entries.get(request_id).map(|entry| entry.value().clone())
    }

    fn upsert(&self, order: WorkOrder) -> bool {
        match self.entries.entry(order.request_id.clone()) {
            Entry::Occupied(mut current) => {
                if order.supersedes(current.get()) {
                    current.insert(Arc::new(order));
                    true
                } else {
                    debug!(request_id = %order.request_id, "Ignoring stale snapshot");
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(order));
                true
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Load every stored work order into the projection
pub async fn rehydrate(
    projection: &dyn StatusProjection,
    store: &dyn WorkOrderRepository,
) -> Result<usize, StoreError> {
    let orders = store.list_all().await?;
    let total = orders.len();
    for order in orders {
        projection.upsert(order);
    }
    info!(orders = total, "Status projection rehydrated from store");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use shared_types::{ChatEnvelope, Department, NewWorkOrder, WorkOrderStatus};
    use work_order_store::InMemoryRepository;

    fn order(request_id: &str) -> WorkOrder {
        let envelope = ChatEnvelope::new(request_id, "g1", Department::RoomService, "menu please");
        NewWorkOrder::from_envelope(&envelope, Utc::now()).with_id(format!("id-{}", request_id))
    }

    #[test]
    fn miss_then_hit() {
        let projection = DashMapProjection::new();
        assert!(projection.get("r-1").is_none());
        assert!(projection.is_empty());

        assert!(projection.upsert(order("r-1")));
        let snapshot = projection.get("r-1").unwrap();
        assert_eq!(snapshot.department, Department::RoomService);
        assert_eq!(projection.len(), 1);
    }

    #[test]
    fn repeated_reads_return_identical_snapshot() {
        let projection = DashMapProjection::new();
        projection.upsert(order("r-1"));

        let a = projection.get("r-1").unwrap();
        let b = projection.get("r-1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn older_snapshot_never_overwrites_newer() {
        let projection = DashMapProjection::new();
        let original = order("r-1");
        let mut newer = original.clone();
        newer.set_status(WorkOrderStatus::InProgress, original.updated_at() + Duration::seconds(10));

        assert!(projection.upsert(newer.clone()));
        assert!(!projection.upsert(original));
        assert_eq!(projection.get("r-1").unwrap().status, WorkOrderStatus::InProgress);

        // equal timestamps may replace
        assert!(projection.upsert(newer));
    }

    #[tokio::test]
    async fn rehydrate_loads_every_stored_order() {
        let store = InMemoryRepository::new();
        for id in ["a", "b", "c"] {
            let envelope = ChatEnvelope::new(id, "g", Department::General, "hello");
            store.insert(NewWorkOrder::from_envelope(&envelope, Utc::now())).await.unwrap();
        }

        let projection = DashMapProjection::new();
        assert_eq!(rehydrate(&projection, &store).await.unwrap(), 3);
        assert_eq!(projection.len(), 3);
        assert_eq!(projection.get("b").unwrap().status, WorkOrderStatus::Pending);
    }
}
