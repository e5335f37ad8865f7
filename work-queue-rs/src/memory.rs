// work-queue-rs/src/memory.rs
// In-process queue with visibility leases

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::{Delivery, MessageQueue, QueueError};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: Uuid,
    body: Vec<u8>,
    deliveries: u32,
}

#[derive(Debug)]
struct Lease {
    message: StoredMessage,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    leased: HashMap<String, Lease>,
}

impl QueueState {
    /// Move expired leases back to the ready list; returns the earliest
    /// remaining expiry.
    fn reclaim_expired(&mut self, now: Instant) -> Option<Instant> {
        let expired: Vec<String> = self
            .leased
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(lease) = self.leased.remove(&receipt) {
                debug!(message_id = %lease.message.id, "Lease expired, message visible again");
                self.ready.push_back(lease.message);
            }
        }

        self.leased.values().map(|lease| lease.expires_at).min()
    }
}

/// Queue held in process memory.
///
/// Each receive leases one message for `visibility_timeout`. An expired or
/// abandoned lease puts the message back on the ready list; the next
/// receive reports a higher `delivery_count`.
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    visibility_timeout: Duration,
    state: Mutex<QueueState>,
    available: Notify,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
        }
    }

    /// Messages waiting to be received
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages currently leased to a receiver
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.leased.len()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, body: Vec<u8>) -> Result<(), QueueError> {
        let message = StoredMessage {
            id: Uuid::new_v4(),
            body,
            deliveries: 0,
        };
        self.state.lock().await.ready.push_back(message);
        self.available.notify_one();
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + wait;

        loop {
            let next_expiry = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let next_expiry = state.reclaim_expired(now);

                if let Some(mut message) = state.ready.pop_front() {
                    message.deliveries += 1;
                    let receipt = format!("{}#{}", message.id, message.deliveries);
                    let delivery = Delivery {
                        receipt: receipt.clone(),
                        body: message.body.clone(),
                        delivery_count: message.deliveries,
                    };
                    state.leased.insert(
                        receipt,
                        Lease {
                            message,
                            expires_at: now + self.visibility_timeout,
                        },
                    );
                    // Other waiters may still have work
                    if !state.ready.is_empty() {
                        self.available.notify_one();
                    }
                    return Ok(Some(delivery));
                }
                next_expiry
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wake_at = next_expiry.map_or(deadline, |expiry| expiry.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, self.available.notified()).await;
        }
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        match state.leased.remove(&delivery.receipt) {
            Some(_) => Ok(()),
            None => Err(QueueError::LeaseLost(delivery.receipt.clone())),
        }
    }

    async fn abandon(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        match state.leased.remove(&delivery.receipt) {
            Some(lease) => {
                state.ready.push_back(lease.message);
                drop(state);
                self.available.notify_one();
                Ok(())
            }
            None => Err(QueueError::LeaseLost(delivery.receipt.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn queue() -> InMemoryQueue {
        InMemoryQueue::new("test", Duration::from_secs(30))
    }

    #[tokio::test]
    async fn fifo_order_and_exact_bytes() {
        let q = queue();
        q.publish(b"first".to_vec()).await.unwrap();
        q.publish(vec![0xff, 0x00, 0x7b]).await.unwrap();

        let a = q.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        let b = q.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(a.body, b"first");
        assert_eq!(b.body, vec![0xff, 0x00, 0x7b]);
        assert_ne!(a.receipt, b.receipt);
    }

    #[tokio::test]
    async fn empty_queue_times_out() {
        let q = queue();
        let started = Instant::now();
        assert!(q.receive(Duration::from_millis(30)).await.unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn acknowledged_message_is_gone() {
        let q = queue();
        q.publish(b"x".to_vec()).await.unwrap();
        let d = q.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        q.acknowledge(&d).await.unwrap();

        assert_eq!(q.in_flight().await, 0);
        assert_eq!(q.ready_len().await, 0);
        assert!(q.receive(Duration::from_millis(10)).await.unwrap().is_none());
        assert!(matches!(q.acknowledge(&d).await, Err(QueueError::LeaseLost(_))));
    }

    #[tokio::test]
    async fn abandoned_message_is_redelivered_with_higher_count() {
        let q = queue();
        q.publish(b"retry me".to_vec()).await.unwrap();

        let first = q.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.delivery_count, 1);
        q.abandon(&first).await.unwrap();

        let second = q.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(second.delivery_count, 2);
        assert_eq!(second.body, first.body);
        assert_ne!(second.receipt, first.receipt);
    }

    #[tokio::test]
    async fn leased_message_is_invisible_until_lease_expires() {
        let q = InMemoryQueue::new("short", Duration::from_millis(40));
        q.publish(b"lease".to_vec()).await.unwrap();

        let first = q.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert!(q.receive(Duration::from_millis(5)).await.unwrap().is_none());

        let again = q.receive(Duration::from_millis(500)).await.unwrap().unwrap();
        assert_eq!(again.delivery_count, 2);
        // the stale receipt can no longer settle the message
        assert!(q.acknowledge(&first).await.is_err());
        q.acknowledge(&again).await.unwrap();
    }

    #[tokio::test]
    async fn blocked_receiver_wakes_on_publish() {
        let q = Arc::new(queue());
        let receiver = {
            let q = q.clone();
            tokio::spawn(async move { q.receive(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.publish(b"wake".to_vec()).await.unwrap();

        let delivery = receiver.await.unwrap().unwrap().unwrap();
        assert_eq!(delivery.body, b"wake");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn each_message_leased_to_one_receiver() {
        let q = Arc::new(queue());
        for i in 0..200u32 {
            q.publish(i.to_be_bytes().to_vec()).await.unwrap();
        }

        let mut workers = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            workers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(d) = q.receive(Duration::from_millis(20)).await.unwrap() {
                    seen.push(d.body.clone());
                    q.acknowledge(&d).await.unwrap();
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for w in workers {
            all.extend(w.await.unwrap());
        }
        assert_eq!(all.len(), 200);
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 200);
    }
}
