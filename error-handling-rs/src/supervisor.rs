//! # Graceful Shutdown
//!
//! A [`ShutdownHandle`] owns the shutdown broadcast for a service, the
//! background tasks that must finish before exit, and the hooks that run
//! when shutdown starts.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

/// A handle for graceful service shutdown
pub struct ShutdownHandle {
    /// Service name
    service_name: String,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Shutdown timeout
    timeout: Duration,
    /// Tasks to wait for
    tasks: Vec<JoinHandle<()>>,
    /// Shutdown hooks
    hooks: Vec<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("service_name", &self.service_name)
            .field("timeout", &self.timeout)
            .field("tasks", &self.tasks.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl ShutdownHandle {
    /// Creates a new shutdown handle
    pub fn new<S: Into<String>>(service_name: S) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            service_name: service_name.into(),
            shutdown_tx,
            timeout: Duration::from_secs(30),
            tasks: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Set the maximum time to wait for graceful shutdown
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a task to wait for during shutdown
    pub fn add_task(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Add a shutdown hook to be called during shutdown
    pub fn add_shutdown_hook<F>(&mut self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    /// Get a shutdown signal receiver
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown and wait for registered tasks
    ///
    /// Returns `true` when every task finished within the timeout.
    pub async fn shutdown(mut self) -> bool {
        info!(service = %self.service_name, "Starting graceful shutdown");

        let _ = self.shutdown_tx.send(());

        for hook in self.hooks.drain(..) {
            hook();
        }

        let mut clean = true;
        if !self.tasks.is_empty() {
            info!(service = %self.service_name, task_count = self.tasks.len(), "Waiting for tasks to complete");

            match timeout(self.timeout, futures::future::join_all(self.tasks)).await {
                Ok(results) => {
                    for result in results {
                        if let Err(err) = result {
                            warn!(service = %self.service_name, error = %err, "Task ended abnormally");
                            clean = false;
                        }
                    }
                    info!(service = %self.service_name, "All tasks completed");
                }
                Err(_) => {
                    warn!(
                        service = %self.service_name,
                        timeout_secs = self.timeout.as_secs(),
                        "Shutdown timed out waiting for tasks"
                    );
                    clean = false;
                }
            }
        }

        info!(service = %self.service_name, "Shutdown complete");
        clean
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_signals_and_waits_for_tasks() {
        let mut handle = ShutdownHandle::new("test-service").with_timeout(Duration::from_secs(5));
        let mut rx = handle.subscribe();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        handle.add_task(tokio::spawn(async move {
            let _ = rx.recv().await;
            flag.store(true, Ordering::SeqCst);
        }));

        let hook_ran = Arc::new(AtomicBool::new(false));
        let hook_flag = hook_ran.clone();
        handle.add_shutdown_hook(move || hook_flag.store(true, Ordering::SeqCst));

        assert!(handle.shutdown().await);
        assert!(finished.load(Ordering::SeqCst));
        assert!(hook_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_times_out_on_stuck_task() {
        let mut handle = ShutdownHandle::new("stuck-service").with_timeout(Duration::from_millis(50));
        handle.add_task(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }));

        assert!(!handle.shutdown().await);
    }
}
