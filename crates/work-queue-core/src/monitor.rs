//! Periodic maintenance tasks.
//!
//! A [`QueueMonitor`] runs one [`MonitorTask`] on a fixed interval until it is
//! stopped. The built-in tasks purge expired messages and old error queue
//! records.

use crate::config::FrozenConfiguration;
use crate::context::lock;
use crate::error::QueueError;
use crate::message::Timestamp;
use crate::transport::{CommitMessage, MaintenanceStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;

/// Work performed on every monitor tick
#[async_trait]
pub trait MonitorTask: Send + Sync + 'static {
    /// Name used in log events
    fn name(&self) -> &'static str;

    /// Run one pass; returns the number of items affected
    async fn run(&self, cancel: &CancellationToken) -> Result<u64, QueueError>;
}

// ============================================================================
// Queue Monitor
// ============================================================================

/// Runs a [`MonitorTask`] every `interval`
pub struct QueueMonitor {
    task: Arc<dyn MonitorTask>,
    interval: Duration,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl QueueMonitor {
    pub fn new(task: Arc<dyn MonitorTask>, interval: Duration) -> Self {
        Self {
            task,
            interval,
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the monitor loop. The first pass runs after one interval.
    pub fn start(&self) -> Result<(), QueueError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(QueueError::already_started(self.task.name()));
        }

        let task = self.task.clone();
        let cancel = self.cancel.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            info!(monitor = task.name(), interval_ms = interval.as_millis() as u64, "Monitor started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                match task.run(&cancel).await {
                    Ok(0) => debug!(monitor = task.name(), "Monitor pass found nothing"),
                    Ok(count) => info!(monitor = task.name(), count, "Monitor pass completed"),
                    Err(e) => warn!(monitor = task.name(), error = %e, "Monitor pass failed"),
                }
            }
            debug!(monitor = task.name(), "Monitor stopped");
        });

        *lock(&self.handle) = Some(handle);
        Ok(())
    }

    /// Cancel the loop and wait for an in-progress pass to observe it
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Signal the loop to exit without waiting for it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }
}

impl Drop for QueueMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Built-in Tasks
// ============================================================================

/// Deletes messages whose expiration time has passed
pub struct ClearExpiredMessages {
    store: Arc<dyn MaintenanceStore>,
    commit: Arc<dyn CommitMessage>,
}

impl ClearExpiredMessages {
    pub fn new(store: Arc<dyn MaintenanceStore>, commit: Arc<dyn CommitMessage>) -> Self {
        Self { store, commit }
    }

    /// Delete expired messages; returns how many deletes affected a row
    pub async fn clear_messages(&self, cancel: &CancellationToken) -> Result<u64, QueueError> {
        if !self.store.is_maintenance_configured() {
            return Ok(0);
        }

        let expired = self.store.find_expired_messages(cancel).await?;
        let mut count = 0;
        for message_id in expired {
            if cancel.is_cancelled() {
                break;
            }
            if self.commit.delete_message(&message_id).await? > 0 {
                debug!(message_id = %message_id, "Deleted expired message");
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl MonitorTask for ClearExpiredMessages {
    fn name(&self) -> &'static str {
        "clear_expired_messages"
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<u64, QueueError> {
        self.clear_messages(cancel).await
    }
}

/// Deletes error queue records older than the configured message age
pub struct ClearErrorMessages {
    configuration: FrozenConfiguration,
    store: Arc<dyn MaintenanceStore>,
}

impl ClearErrorMessages {
    pub fn new(configuration: FrozenConfiguration, store: Arc<dyn MaintenanceStore>) -> Self {
        Self {
            configuration,
            store,
        }
    }

    /// Delete old error records; returns how many deletes affected a row
    pub async fn clear_messages(&self, cancel: &CancellationToken) -> Result<u64, QueueError> {
        if !self.store.is_maintenance_configured() {
            return Ok(0);
        }

        let older_than = Timestamp::now().sub(self.configuration.message_error().message_age);
        let candidates = self
            .store
            .find_error_messages_to_delete(older_than, cancel)
            .await?;

        let mut count = 0;
        for message_id in candidates {
            if cancel.is_cancelled() {
                break;
            }
            if self.store.delete_error_message(&message_id).await? > 0 {
                debug!(message_id = %message_id, "Deleted error message");
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl MonitorTask for ClearErrorMessages {
    fn name(&self) -> &'static str {
        "clear_error_messages"
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<u64, QueueError> {
        self.clear_messages(cancel).await
    }
}
