//! Work Queue Library
//!
//! At-least-once hand-off between the intake gateway and the work-order
//! consumer. A received message is leased to exactly one receiver until it
//! is acknowledged, abandoned, or its lease expires.
//!
//! Backends are selected by URL:
//! - `memory://` an in-process queue with visibility leases
//! - `redis://host:port/db` the reliable-list pattern on a Redis server

mod error;
mod memory;
mod redis_queue;

pub use error::QueueError;
pub use memory::InMemoryQueue;
pub use redis_queue::RedisQueue;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// A leased message. Pass it back to `acknowledge` or `abandon`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Backend-specific lease token
    pub receipt: String,
    pub body: Vec<u8>,
    /// 1 on first delivery, incremented on every redelivery
    pub delivery_count: u32,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Queue name, used in logs and metrics labels
    fn name(&self) -> &str;

    async fn publish(&self, body: Vec<u8>) -> Result<(), QueueError>;

    /// Wait up to `wait` for a message. `None` when nothing arrived.
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Remove the message permanently
    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Release the lease so the message is redelivered right away
    async fn abandon(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Return messages leased by a previous process to the ready list.
    /// Backends without cross-process leases have nothing to recover.
    async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        Ok(0)
    }
}

/// Open the queue named `name` at `url`.
///
/// `visibility_timeout` applies to the in-memory backend; Redis leases
/// last until acknowledged, abandoned, or recovered at consumer start-up.
pub async fn connect_queue(
    url: &str,
    name: &str,
    visibility_timeout: Duration,
) -> Result<Arc<dyn MessageQueue>, QueueError> {
    if url.starts_with("memory://") {
        Ok(Arc::new(InMemoryQueue::new(name, visibility_timeout)))
    } else if url.starts_with("redis://") || url.starts_with("rediss://") {
        Ok(Arc::new(RedisQueue::connect(url, name).await?))
    } else {
        Err(QueueError::UnsupportedUrl(url.to_string()))
    }
}
