//! Consumer composition root.
//!
//! [`QueueConsumer`] wires a frozen configuration, one transport and one
//! handler into a running engine: scheduler, worker pool, heartbeat sender
//! and reset monitor, and the purge monitors.
//!
//! # Examples
//!
//! ```rust,no_run
//! use work_queue_core::config::ConsumerConfiguration;
//! use work_queue_core::consumer::QueueConsumer;
//! use work_queue_core::handler::FnHandler;
//! use work_queue_core::providers::InMemoryTransport;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), work_queue_core::QueueError> {
//! let configuration = ConsumerConfiguration::new().freeze()?;
//! let transport = Arc::new(InMemoryTransport::default());
//! let consumer = QueueConsumer::new(
//!     configuration,
//!     transport,
//!     FnHandler::new(|message, _notification| async move {
//!         println!("received {}", message.message_id);
//!         Ok::<(), work_queue_core::ProcessingError>(())
//!     }),
//! );
//!
//! consumer.start()?;
//! tokio::signal::ctrl_c().await.ok();
//! consumer.stop().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::FrozenConfiguration;
use crate::error::QueueError;
use crate::error_handling::{ReceiveMessagesError, ReceivePoisonMessage};
use crate::handler::MessageHandler;
use crate::heartbeat::{HeartBeatMonitor, HeartBeatWorker, ResetHeartBeat, SendHeartBeat};
use crate::monitor::{ClearErrorMessages, ClearExpiredMessages, QueueMonitor};
use crate::scheduler::{SemaphoreTaskScheduler, TaskScheduler, WorkGroup};
use crate::transport::Transport;
use crate::worker::{MessageProcessor, StopOutcome, WorkerCollection};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// A running message consumer
pub struct QueueConsumer {
    configuration: FrozenConfiguration,
    scheduler: Arc<dyn TaskScheduler>,
    owns_scheduler: bool,
    workers: WorkerCollection,
    heart_beat_monitor: Option<HeartBeatMonitor>,
    expiration_monitor: Option<QueueMonitor>,
    error_monitor: Option<QueueMonitor>,
    started: AtomicBool,
    stopped: AtomicBool,
    disposed: AtomicBool,
}

impl QueueConsumer {
    /// Build a consumer with its own scheduler sized from the configuration
    pub fn new<T, H>(configuration: FrozenConfiguration, transport: Arc<T>, handler: H) -> Self
    where
        T: Transport,
        H: MessageHandler,
    {
        let scheduler = Arc::new(SemaphoreTaskScheduler::from_configuration(&configuration));
        Self::build(configuration, transport, Arc::new(handler), scheduler, true, None)
    }

    /// Build a consumer running on a shared scheduler, optionally inside a
    /// work group. The caller starts and disposes the scheduler.
    pub fn with_scheduler<T, H>(
        configuration: FrozenConfiguration,
        transport: Arc<T>,
        handler: H,
        scheduler: Arc<dyn TaskScheduler>,
        work_group: Option<WorkGroup>,
    ) -> Self
    where
        T: Transport,
        H: MessageHandler,
    {
        Self::build(
            configuration,
            transport,
            Arc::new(handler),
            scheduler,
            false,
            work_group,
        )
    }

    fn build<T: Transport>(
        configuration: FrozenConfiguration,
        transport: Arc<T>,
        handler: Arc<dyn MessageHandler>,
        scheduler: Arc<dyn TaskScheduler>,
        owns_scheduler: bool,
        work_group: Option<WorkGroup>,
    ) -> Self {
        let heart_beat = configuration.heart_beat().clone();

        let sender = Arc::new(SendHeartBeat::new(transport.clone()));
        let processor = Arc::new(MessageProcessor {
            handler,
            commit: transport.clone(),
            rollback: transport.clone(),
            receive_error: ReceiveMessagesError::new(configuration.clone(), transport.clone()),
            poison: ReceivePoisonMessage::new(transport.clone()),
            heart_beat: heart_beat
                .enabled
                .then(|| HeartBeatWorker::new(sender, heart_beat.clone())),
        });

        let workers = WorkerCollection::new(
            configuration.worker().clone(),
            transport.clone(),
            transport.clone(),
            scheduler.clone(),
            work_group,
            processor,
        );

        let heart_beat_monitor = heart_beat.enabled.then(|| {
            HeartBeatMonitor::new(
                Arc::new(ResetHeartBeat::new(configuration.clone(), transport.clone())),
                heart_beat.monitor_time,
            )
        });

        let expiration = configuration.message_expiration();
        let expiration_monitor = expiration.enabled.then(|| {
            QueueMonitor::new(
                Arc::new(ClearExpiredMessages::new(transport.clone(), transport.clone())),
                expiration.monitor_time,
            )
        });

        let error = configuration.message_error();
        let error_monitor = error.enabled.then(|| {
            QueueMonitor::new(
                Arc::new(ClearErrorMessages::new(configuration.clone(), transport.clone())),
                error.monitor_time,
            )
        });

        Self {
            configuration,
            scheduler,
            owns_scheduler,
            workers,
            heart_beat_monitor,
            expiration_monitor,
            error_monitor,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn configuration(&self) -> &FrozenConfiguration {
        &self.configuration
    }

    pub fn workers(&self) -> &WorkerCollection {
        &self.workers
    }

    /// Start every component. May only be called once.
    pub fn start(&self) -> Result<(), QueueError> {
        if self.is_disposed() {
            return Err(QueueError::disposed("QueueConsumer"));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(QueueError::already_started("QueueConsumer"));
        }

        if self.owns_scheduler {
            self.scheduler.start()?;
        }
        if let Some(monitor) = &self.heart_beat_monitor {
            monitor.start()?;
        }
        if let Some(monitor) = &self.expiration_monitor {
            monitor.start()?;
        }
        if let Some(monitor) = &self.error_monitor {
            monitor.start()?;
        }
        self.workers.start()?;

        info!(
            worker_count = self.configuration.worker().worker_count,
            heart_beat = self.heart_beat_monitor.is_some(),
            message_expiration = self.expiration_monitor.is_some(),
            message_error = self.error_monitor.is_some(),
            "Queue consumer started"
        );
        Ok(())
    }

    /// Stop workers with the configured escalation, then the monitors
    pub async fn stop(&self) -> Result<StopOutcome, QueueError> {
        if self.is_disposed() {
            return Err(QueueError::disposed("QueueConsumer"));
        }
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(StopOutcome::NotRunning);
        }

        let outcome = self.workers.stop().await?;

        if let Some(monitor) = &self.heart_beat_monitor {
            monitor.stop().await;
        }
        if let Some(monitor) = &self.expiration_monitor {
            monitor.stop().await;
        }
        if let Some(monitor) = &self.error_monitor {
            monitor.stop().await;
        }
        if self.owns_scheduler {
            self.scheduler.shutdown().await;
        }

        info!(outcome = ?outcome, "Queue consumer stopped");
        Ok(outcome)
    }

    /// Tear down immediately. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.workers.dispose();
        if let Some(monitor) = &self.heart_beat_monitor {
            monitor.cancel();
        }
        for monitor in [&self.expiration_monitor, &self.error_monitor]
            .into_iter()
            .flatten()
        {
            monitor.cancel();
        }
        if self.owns_scheduler {
            self.scheduler.dispose();
        }
        info!("Queue consumer disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
