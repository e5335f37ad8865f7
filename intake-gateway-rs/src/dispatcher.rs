// intake-gateway-rs/src/dispatcher.rs
// Supervised background publishing of envelopes to the work-order queue.
//
// Handlers enqueue onto a bounded channel and return immediately; a fixed
// pool of workers drains the channel and publishes with bounded retries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use error_handling_rs::{retry, RetryPolicy};
use metrics::counter;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use work_queue::MessageQueue;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub capacity: usize,
    pub enqueue_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            capacity: 1024,
            enqueue_timeout: Duration::from_millis(250),
            retry: RetryPolicy::network(),
        }
    }
}

#[derive(Debug)]
pub struct OutboundMessage {
    pub request_id: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time view of the dispatcher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublishStats {
    /// Enqueued for publishing
    pub accepted: u64,
    pub published: u64,
    /// Gave up after retries
    pub failed: u64,
    /// Could not be enqueued (channel full past the timeout, or closed)
    pub rejected: u64,
}

pub struct PublishDispatcher {
    sender: Mutex<Option<mpsc::Sender<OutboundMessage>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    enqueue_timeout: Duration,
}

impl PublishDispatcher {
    /// Spawn the worker pool. Must be called inside a Tokio runtime.
    pub fn start(queue: Arc<dyn MessageQueue>, config: DispatcherConfig) -> Self {
        let (tx, rx) = mpsc::channel::<OutboundMessage>(config.capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(publish_worker(
                    worker_id,
                    rx.clone(),
                    queue.clone(),
                    config.retry.clone(),
                    counters.clone(),
                ))
            })
            .collect();

        info!(
            queue = queue.name(),
            workers = config.workers.max(1),
            capacity = config.capacity,
            "Publish dispatcher started"
        );

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            counters,
            enqueue_timeout: config.enqueue_timeout,
        }
    }

    /// Hand a message to the worker pool, waiting at most the enqueue timeout.
    /// Returns false when the message was rejected.
    pub async fn enqueue(&self, message: OutboundMessage) -> bool {
        let sender = match self.sender.lock().await.as_ref() {
            Some(sender) => sender.clone(),
            None => {
                self.reject(&message.request_id, "dispatcher is shut down");
                return false;
            }
        };

        let request_id = message.request_id.clone();
        match sender.send_timeout(message, self.enqueue_timeout).await {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                counter!("intake.publish.accepted", 1);
                true
            }
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                self.reject(&request_id, "publish backlog full");
                false
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                self.reject(&request_id, "dispatcher is shut down");
                false
            }
        }
    }

    fn reject(&self, request_id: &str, reason: &str) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        counter!("intake.publish.rejected", 1);
        warn!(request_id, reason, "Envelope not handed to publisher");
    }

    pub async fn is_accepting(&self) -> bool {
        self.sender.lock().await.is_some()
    }

    pub fn stats(&self) -> PublishStats {
        PublishStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            published: self.counters.published.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Close the channel and wait for in-flight publishes to drain.
    /// Returns false if the workers did not finish within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.sender.lock().await.take();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();

        let drained = tokio::time::timeout(timeout, join_workers(workers)).await.is_ok();
        if drained {
            info!(stats = ?self.stats(), "Publish dispatcher drained");
        } else {
            warn!(stats = ?self.stats(), "Publish dispatcher did not drain before timeout");
        }
        drained
    }
}

async fn join_workers(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "Publish worker panicked");
        }
    }
}

async fn publish_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
    queue: Arc<dyn MessageQueue>,
    policy: RetryPolicy,
    counters: Arc<Counters>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(message) = next else {
            debug!(worker_id, "Publish channel closed, worker exiting");
            return;
        };

        let result = retry(&policy, || {
            let queue = queue.clone();
            let body = message.body.clone();
            async move { queue.publish(body).await }
        })
        .await;

        match result {
            Ok(()) => {
                counters.published.fetch_add(1, Ordering::Relaxed);
                counter!("intake.publish.published", 1);
                debug!(worker_id, request_id = %message.request_id, "Envelope published");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                counter!("intake.publish.failed", 1);
                error!(
                    worker_id,
                    request_id = %message.request_id,
                    error = %e,
                    "Failed to publish envelope after retries"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use error_handling_rs::RetryConfig;
    use work_queue::{Delivery, InMemoryQueue, QueueError};

    struct BrokenQueue;

    #[async_trait]
    impl MessageQueue for BrokenQueue {
        fn name(&self) -> &str {
            "broken"
        }
        async fn publish(&self, _body: Vec<u8>) -> Result<(), QueueError> {
            Err(QueueError::Unavailable("connection refused".into()))
        }
        async fn receive(&self, _wait: Duration) -> Result<Option<Delivery>, QueueError> {
            Ok(None)
        }
        async fn acknowledge(&self, _delivery: &Delivery) -> Result<(), QueueError> {
            Ok(())
        }
        async fn abandon(&self, _delivery: &Delivery) -> Result<(), QueueError> {
            Ok(())
        }
    }

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            workers: 2,
            capacity: 8,
            enqueue_timeout: Duration::from_millis(50),
            retry: RetryPolicy::new(
                "test",
                Some(RetryConfig {
                    max_retries: 2,
                    base_backoff: Duration::from_millis(1),
                    max_backoff: Duration::from_millis(2),
                    jitter_factor: 0.0,
                    retry_only_transient: true,
                }),
            ),
        }
    }

    fn message(id: &str) -> OutboundMessage {
        OutboundMessage {
            request_id: id.to_string(),
            body: id.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn publishes_and_drains_on_shutdown() {
        let queue = Arc::new(InMemoryQueue::new("q", Duration::from_secs(30)));
        let dispatcher = PublishDispatcher::start(queue.clone(), fast_config());

        for i in 0..5 {
            assert!(dispatcher.enqueue(message(&format!("r-{}", i))).await);
        }
        assert!(dispatcher.shutdown(Duration::from_secs(5)).await);

        let stats = dispatcher.stats();
        assert_eq!(stats.accepted, 5);
        assert_eq!(stats.published, 5);
        assert_eq!(stats.failed, 0);
        assert_eq!(queue.ready_len().await, 5);
    }

    #[tokio::test]
    async fn failed_publish_is_counted() {
        let dispatcher = PublishDispatcher::start(Arc::new(BrokenQueue), fast_config());
        assert!(dispatcher.enqueue(message("r-1")).await);
        assert!(dispatcher.shutdown(Duration::from_secs(5)).await);

        let stats = dispatcher.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.published, 0);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_rejected() {
        let queue = Arc::new(InMemoryQueue::new("q", Duration::from_secs(30)));
        let dispatcher = PublishDispatcher::start(queue, fast_config());
        dispatcher.shutdown(Duration::from_secs(1)).await;

        assert!(!dispatcher.enqueue(message("late")).await);
        assert_eq!(dispatcher.stats().rejected, 1);
    }
}
