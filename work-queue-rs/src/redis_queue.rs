// work-queue-rs/src/redis_queue.rs
// Reliable-list queue on Redis
//
// Ready list `{name}` receives LPUSH; a receive LMOVEs the tail into
// `{name}:processing`. Acknowledge removes the entry from the processing
// list. Abandon and start-up recovery move it back with its delivery
// count bumped. Entries pushed by other producers are wrapped in place on
// first receive so every receipt is an exact list value.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{Delivery, MessageQueue, QueueError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueuedMessage {
    id: Uuid,
    /// Completed deliveries before this one
    deliveries: u32,
    body: String,
}

impl QueuedMessage {
    fn new(body: &[u8]) -> Self {
        Self {
            id: Uuid::new_v4(),
            deliveries: 0,
            body: STANDARD.encode(body),
        }
    }

    fn encode(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Corrupt(e.to_string()))
    }

    fn decode(raw: &[u8]) -> Result<Self, QueueError> {
        serde_json::from_slice(raw).map_err(|e| QueueError::Corrupt(e.to_string()))
    }

    fn redelivered(&self) -> Self {
        Self {
            id: self.id,
            deliveries: self.deliveries.saturating_add(1),
            body: self.body.clone(),
        }
    }
}

pub struct RedisQueue {
    name: String,
    processing: String,
    connection: ConnectionManager,
}

impl RedisQueue {
    pub async fn connect(url: &str, name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Unavailable(format!("cannot connect to {}: {}", url, e)))?;

        info!(queue = name, "Connected to Redis queue");
        Ok(Self {
            name: name.to_string(),
            processing: format!("{}:processing", name),
            connection,
        })
    }

    async fn requeue(&self, raw: &[u8], message: &QueuedMessage) -> Result<bool, QueueError> {
        let mut conn = self.connection.clone();
        let next = message.redelivered().encode()?;
        let (removed, _): (i64, i64) = redis::pipe()
            .atomic()
            .lrem(&self.processing, 1, raw)
            .rpush(&self.name, &next)
            .query_async(&mut conn)
            .await?;

        if removed == 0 {
            // The entry was settled elsewhere; undo the push.
            let _: i64 = conn.lrem(&self.name, -1, &next).await?;
        }
        Ok(removed > 0)
    }

    /// Turn a freshly leased entry into a delivery
    async fn lease(&self, raw: Vec<u8>) -> Result<Delivery, QueueError> {
        match QueuedMessage::decode(&raw) {
            Ok(message) => {
                let receipt = String::from_utf8(raw).map_err(|e| QueueError::Corrupt(e.to_string()))?;
                let body = STANDARD
                    .decode(&message.body)
                    .unwrap_or_else(|_| receipt.clone().into_bytes());
                Ok(Delivery {
                    receipt,
                    body,
                    delivery_count: message.deliveries.saturating_add(1),
                })
            }
            Err(e) => {
                warn!(queue = %self.name, error = %e, "Wrapping foreign queue entry");
                let receipt = QueuedMessage::new(&raw).encode()?;
                let mut conn = self.connection.clone();
                let (removed, _): (i64, i64) = redis::pipe()
                    .atomic()
                    .lrem(&self.processing, 1, &raw)
                    .lpush(&self.processing, &receipt)
                    .query_async(&mut conn)
                    .await?;
                if removed == 0 {
                    let _: i64 = conn.lrem(&self.processing, 1, &receipt).await?;
                    return Err(QueueError::LeaseLost(receipt));
                }
                Ok(Delivery {
                    receipt,
                    body: raw,
                    delivery_count: 1,
                })
            }
        }
    }
}

#[async_trait]
impl MessageQueue for RedisQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, body: Vec<u8>) -> Result<(), QueueError> {
        let payload = QueuedMessage::new(&body).encode()?;
        let mut conn = self.connection.clone();
        let _: i64 = conn.lpush(&self.name, payload).await?;
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + wait;
        let mut conn = self.connection.clone();

        loop {
            // LMOVE does not block the shared multiplexed connection
            let raw: Option<Vec<u8>> = redis::cmd("LMOVE")
                .arg(&self.name)
                .arg(&self.processing)
                .arg("RIGHT")
                .arg("LEFT")
                .query_async(&mut conn)
                .await?;

            if let Some(raw) = raw {
                return self.lease(raw).await.map(Some);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.lrem(&self.processing, 1, &delivery.receipt).await?;
        if removed == 0 {
            return Err(QueueError::LeaseLost(delivery.receipt.clone()));
        }
        Ok(())
    }

    async fn abandon(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let message = match QueuedMessage::decode(delivery.receipt.as_bytes()) {
            Ok(message) => message,
            Err(_) => {
                // Not one of ours; re-wrap so the next delivery is countable
                let mut message = QueuedMessage::new(&delivery.body);
                message.deliveries = delivery.delivery_count.saturating_sub(1);
                message
            }
        };

        if self.requeue(delivery.receipt.as_bytes(), &message).await? {
            Ok(())
        } else {
            Err(QueueError::LeaseLost(delivery.receipt.clone()))
        }
    }

    async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection.clone();
        let orphaned: Vec<Vec<u8>> = conn.lrange(&self.processing, 0, -1).await?;

        let mut recovered = 0;
        for raw in orphaned {
            let message = match QueuedMessage::decode(&raw) {
                Ok(message) => message,
                Err(e) => {
                    warn!(queue = %self.name, error = %e, "Recovering foreign processing entry");
                    QueuedMessage::new(&raw)
                }
            };
            if self.requeue(&raw, &message).await? {
                recovered += 1;
            }
        }

        if recovered > 0 {
            info!(queue = %self.name, recovered, "Returned in-flight messages to the ready list");
        }
        Ok(recovered)
    }
}
