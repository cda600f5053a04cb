use super::SendHeartBeat;
use crate::config::HeartBeatConfiguration;
use crate::context::MessageContext;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{trace, warn};

/// Schedules periodic heartbeats for in-flight messages.
///
/// Every started message gets its own loop; concurrent sends across all
/// loops are bounded by the heartbeat pool size.
pub struct HeartBeatWorker {
    sender: Arc<SendHeartBeat>,
    configuration: HeartBeatConfiguration,
    permits: Arc<Semaphore>,
}

impl HeartBeatWorker {
    pub fn new(sender: Arc<SendHeartBeat>, configuration: HeartBeatConfiguration) -> Self {
        let permits = Arc::new(Semaphore::new(
            configuration
                .thread_pool
                .threads_max
                .clamp(1, Semaphore::MAX_PERMITS),
        ));
        Self {
            sender,
            configuration,
            permits,
        }
    }

    /// Start sending heartbeats for `context`.
    ///
    /// Returns `None` when heartbeats are disabled or the store is not
    /// configured. Must be called from within a tokio runtime.
    pub fn start(&self, context: Arc<MessageContext>) -> Option<HeartBeatHandle> {
        if !self.configuration.enabled || !self.sender.is_configured() {
            return None;
        }

        let stop = CancellationToken::new();
        let task = tokio::spawn(heart_beat_loop(
            self.sender.clone(),
            self.permits.clone(),
            self.configuration.update_time,
            context,
            stop.clone(),
        ));

        Some(HeartBeatHandle {
            _cancel_on_drop: stop.clone().drop_guard(),
            stop,
            task,
            wait_for_finish: self.configuration.thread_pool.wait_for_thread_pool_to_finish,
        })
    }

    /// Sends currently allowed to run concurrently
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

async fn heart_beat_loop(
    sender: Arc<SendHeartBeat>,
    permits: Arc<Semaphore>,
    update_time: std::time::Duration,
    context: Arc<MessageContext>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(update_time) => {}
        }

        let permit = tokio::select! {
            _ = stop.cancelled() => break,
            permit = permits.clone().acquire_owned() => permit,
        };
        let Ok(_permit) = permit else {
            break;
        };

        match sender.send(&context).await {
            Ok(Some(_)) => trace!(message_id = %context.message_id(), "Heartbeat renewed"),
            Ok(None) => {}
            Err(e) => warn!(
                message_id = %context.message_id(),
                error = %e,
                "Failed to send heartbeat"
            ),
        }
    }
}

/// Stops the heartbeat loop of one message. Dropping the handle also stops
/// the loop, without waiting for it.
pub struct HeartBeatHandle {
    _cancel_on_drop: DropGuard,
    stop: CancellationToken,
    task: JoinHandle<()>,
    wait_for_finish: bool,
}

impl HeartBeatHandle {
    /// Stop sending heartbeats, waiting for an in-progress send if the pool
    /// is configured to finish its work
    pub async fn stop(self) {
        self.stop.cancel();
        if self.wait_for_finish {
            let _ = self.task.await;
        }
    }
}
