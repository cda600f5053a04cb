use crate::config::FrozenConfiguration;
use crate::error::QueueError;
use crate::message::{MessageHeaders, MessageId, Timestamp};
use crate::transport::HeartBeatStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A message returned to the waiting state by a reset sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetHeartBeatOutput {
    pub message_id: MessageId,
    pub headers: MessageHeaders,
    /// When the sweep that reset this message started
    pub approximate_reset_time_start: Timestamp,
    /// When this message was reset
    pub approximate_reset_time_end: Timestamp,
}

/// Returns messages with stale heartbeats to the queue
pub struct ResetHeartBeat {
    configuration: FrozenConfiguration,
    store: Arc<dyn HeartBeatStore>,
}

impl ResetHeartBeat {
    pub fn new(configuration: FrozenConfiguration, store: Arc<dyn HeartBeatStore>) -> Self {
        Self {
            configuration,
            store,
        }
    }

    /// Find processing messages whose heartbeat is older than the configured
    /// staleness threshold and release each one.
    ///
    /// Each release is a conditional update; a message whose lease was
    /// renewed, or which another sweep already released, is skipped. Only
    /// successful resets are returned. Stops early when `cancel` fires.
    pub async fn reset(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResetHeartBeatOutput>, QueueError> {
        let settings = self.configuration.heart_beat();
        if !settings.enabled || !self.store.is_heart_beat_configured() {
            return Ok(Vec::new());
        }

        let start = Timestamp::now();
        let stale_before = start.sub(settings.time);
        let candidates = self.store.find_messages_to_reset(stale_before, cancel).await?;

        let mut results = Vec::new();
        for (message_id, headers) in candidates {
            if cancel.is_cancelled() {
                break;
            }

            let rows = self.store.reset_heart_beat(&message_id, stale_before).await?;
            if rows == 0 {
                debug!(message_id = %message_id, "Heartbeat reset skipped; lease changed");
                continue;
            }

            info!(message_id = %message_id, "Reset stale heartbeat");
            results.push(ResetHeartBeatOutput {
                message_id,
                headers,
                approximate_reset_time_start: start,
                approximate_reset_time_end: Timestamp::now(),
            });
        }

        Ok(results)
    }
}
