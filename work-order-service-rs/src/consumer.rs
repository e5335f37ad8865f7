// work-order-service-rs/src/consumer.rs
// Queue consumer: envelope -> durable work order -> status projection.
//
// Each worker owns at most one leased delivery at a time. A delivery is
// acknowledged only after the store accepted it (or it was dropped on
// purpose); store failures hand it back to the queue for redelivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use error_handling_rs::{CircuitBreaker, CircuitBreakerConfig, CircuitHealth, RetryPolicy, ShutdownHandle};
use metrics::counter;
use serde::Serialize;
use shared_types::{ChatEnvelope, NewWorkOrder};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};
use work_order_store::{StoreError, WorkOrderRepository};
use work_queue::{Delivery, MessageQueue};

use crate::projection::StatusProjection;

/// Deliveries a malformed message gets when no limit is configured and the
/// dead-letter queue rejects it
pub const MALFORMED_MAX_DELIVERIES: u32 = 5;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub workers: usize,
    /// Upper bound on a single blocking receive
    pub receive_wait: Duration,
    /// Dead-letter a message once its delivery count reaches this; `None`
    /// retries forever
    pub max_deliveries: Option<u32>,
    pub backoff: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            receive_wait: Duration::from_secs(5),
            max_deliveries: None,
            backoff: RetryPolicy::database(),
            breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                reset_timeout: Duration::from_secs(10),
                ..Default::default()
            },
        }
    }
}

/// What happened to a single delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Stored,
    Duplicate,
    Malformed,
    DeadLettered,
    /// Handed back to the queue; the worker should pause for `backoff`
    Retrying { backoff: Duration },
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    duplicates: AtomicU64,
    malformed: AtomicU64,
    store_failures: AtomicU64,
    dead_lettered: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub processed: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub store_failures: u64,
    pub dead_lettered: u64,
}

pub struct WorkOrderConsumer {
    queue: Arc<dyn MessageQueue>,
    dead_letter: Option<Arc<dyn MessageQueue>>,
    store: Arc<dyn WorkOrderRepository>,
    projection: Arc<dyn StatusProjection>,
    breaker: CircuitBreaker,
    counters: Counters,
    config: ConsumerConfig,
}

impl WorkOrderConsumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn WorkOrderRepository>,
        projection: Arc<dyn StatusProjection>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            breaker: CircuitBreaker::new("work-order-store", Some(config.breaker.clone())),
            queue,
            dead_letter: None,
            store,
            projection,
            counters: Counters::default(),
            config,
        }
    }

    pub fn with_dead_letter(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.dead_letter = Some(queue);
        self
    }

    pub fn stats(&self) -> ConsumerStats {
        ConsumerStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            store_failures: self.counters.store_failures.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
        }
    }

    pub fn circuit_health(&self) -> CircuitHealth {
        self.breaker.get_health()
    }

    /// Start `config.workers` consumer loops, registered with `shutdown`
    pub fn spawn_workers(self: &Arc<Self>, shutdown: &mut ShutdownHandle) {
        let workers = self.config.workers.max(1);
        for worker_id in 0..workers {
            let signal = shutdown.subscribe();
            shutdown.add_task(tokio::spawn(self.clone().run_worker(worker_id, signal)));
        }
        info!(queue = self.queue.name(), workers, "Work-order consumer started");
    }

    async fn run_worker(self: Arc<Self>, worker_id: usize, mut shutdown: broadcast::Receiver<()>) {
        loop {
            // receive is not raced against shutdown: a leased delivery must
            // always reach process_delivery
            if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }

            if !self.breaker.is_allowed() {
                let pause = self
                    .breaker
                    .remaining_open_time()
                    .unwrap_or_default()
                    .max(Duration::from_millis(10));
                debug!(worker_id, pause_ms = pause.as_millis() as u64, "Store circuit open, pausing");
                if pause_or_shutdown(&mut shutdown, pause).await {
                    break;
                }
                continue;
            }

            let delivery = match self.queue.receive(self.config.receive_wait).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    self.breaker.release();
                    continue;
                }
                Err(e) => {
                    self.breaker.release();
                    let backoff = self.config.backoff.calculate_backoff(&e, 0);
                    warn!(worker_id, error = %e, "Queue receive failed");
                    if pause_or_shutdown(&mut shutdown, backoff).await {
                        break;
                    }
                    continue;
                }
            };

            if let DeliveryOutcome::Retrying { backoff } = self.process_delivery(delivery).await {
                if pause_or_shutdown(&mut shutdown, backoff).await {
                    break;
                }
            }
        }
        debug!(worker_id, "Consumer worker exiting");
    }

    /// Decode, persist, acknowledge and project a single delivery
    pub async fn process_delivery(&self, delivery: Delivery) -> DeliveryOutcome {
        let envelope = match ChatEnvelope::from_slice(&delivery.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.breaker.release();
                warn!(receipt = %delivery.receipt, error = %e, "Dropping malformed queue message");
                if !self.forward_to_dead_letter(&delivery).await {
                    let ceiling = self.config.max_deliveries.unwrap_or(MALFORMED_MAX_DELIVERIES);
                    if delivery.delivery_count < ceiling {
                        return self.hand_back(&delivery, None).await;
                    }
                    error!(
                        receipt = %delivery.receipt,
                        delivery_count = delivery.delivery_count,
                        "Dead-letter queue unavailable, discarding malformed message"
                    );
                }
                self.acknowledge(&delivery).await;
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                counter!("work_orders.malformed", 1);
                return DeliveryOutcome::Malformed;
            }
        };

        let request_id = envelope.request_id.clone();
        let order = NewWorkOrder::from_envelope(&envelope, Utc::now());

        match self.store.insert(order).await {
            Ok(outcome) => {
                self.breaker.record_success();
                self.acknowledge(&delivery).await;

                let duplicate = outcome.is_duplicate();
                let order = outcome.into_work_order();
                let department = order.department;
                self.projection.upsert(order);

                if duplicate {
                    self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                    counter!("work_orders.duplicates", 1);
                    info!(request_id, "Work order already stored, redelivery acknowledged");
                    DeliveryOutcome::Duplicate
                } else {
                    self.counters.processed.fetch_add(1, Ordering::Relaxed);
                    counter!("work_orders.processed", 1, "department" => department.as_str());
                    info!(request_id, %department, "Work order stored");
                    DeliveryOutcome::Stored
                }
            }
            Err(e) => {
                self.breaker.record_failure();
                self.counters.store_failures.fetch_add(1, Ordering::Relaxed);
                counter!("work_orders.store_failures", 1);
                error!(
                    request_id,
                    delivery_count = delivery.delivery_count,
                    error = %e,
                    "Failed to store work order"
                );

                let exhausted = self
                    .config
                    .max_deliveries
                    .is_some_and(|max| delivery.delivery_count >= max);
                if exhausted && self.forward_to_dead_letter(&delivery).await {
                    self.acknowledge(&delivery).await;
                    self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
                    counter!("work_orders.dead_lettered", 1);
                    warn!(request_id, delivery_count = delivery.delivery_count, "Delivery limit reached, message dead-lettered");
                    return DeliveryOutcome::DeadLettered;
                }

                self.hand_back(&delivery, Some(&e)).await
            }
        }
    }

    /// Publish the raw body to the dead-letter queue, if one is configured.
    /// Returns false only when a configured dead-letter publish failed.
    async fn forward_to_dead_letter(&self, delivery: &Delivery) -> bool {
        let Some(dead_letter) = &self.dead_letter else {
            return true;
        };
        match dead_letter.publish(delivery.body.clone()).await {
            Ok(()) => true,
            Err(e) => {
                error!(receipt = %delivery.receipt, queue = dead_letter.name(), error = %e, "Dead-letter publish failed");
                false
            }
        }
    }

    async fn acknowledge(&self, delivery: &Delivery) {
        if let Err(e) = self.queue.acknowledge(delivery).await {
            // Redelivery is harmless: the store de-duplicates by request ID
            warn!(receipt = %delivery.receipt, error = %e, "Failed to acknowledge delivery");
        }
    }

    /// Abandon the delivery and compute the pause before the next receive
    async fn hand_back(&self, delivery: &Delivery, cause: Option<&StoreError>) -> DeliveryOutcome {
        if let Err(e) = self.queue.abandon(delivery).await {
            // the lease expires on its own
            warn!(receipt = %delivery.receipt, error = %e, "Failed to abandon delivery");
        }

        let attempt = delivery.delivery_count.saturating_sub(1) as usize;
        let backoff = match cause {
            Some(e) => self.config.backoff.calculate_backoff(e, attempt),
            None => self.config.backoff.backoff_for_attempt(attempt),
        };
        DeliveryOutcome::Retrying { backoff }
    }
}

/// Sleep for `pause`; true when shutdown arrived first
async fn pause_or_shutdown(shutdown: &mut broadcast::Receiver<()>, pause: Duration) -> bool {
    tokio::select! {
        _ = shutdown.recv() => true,
        _ = tokio::time::sleep(pause) => false,
    }
}
