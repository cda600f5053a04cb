use crate::context::MessageContext;
use crate::error::QueueError;
use crate::message::Timestamp;
use crate::transport::HeartBeatStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Renews the heartbeat lease of an in-flight message
pub struct SendHeartBeat {
    store: Arc<dyn HeartBeatStore>,
}

impl SendHeartBeat {
    pub fn new(store: Arc<dyn HeartBeatStore>) -> Self {
        Self { store }
    }

    /// Renew the lease for the context's message.
    ///
    /// Returns `None` when the store updated no rows, meaning this worker no
    /// longer owns the message. The outcome is recorded on the context's
    /// worker notification either way.
    pub async fn send(&self, context: &MessageContext) -> Result<Option<Timestamp>, QueueError> {
        let message_id = context.message_id();
        if !message_id.has_value() {
            return Ok(None);
        }

        let notification = context.worker_notification();
        match self.store.send_heart_beat(&message_id).await {
            Ok(Some(timestamp)) => {
                debug!(message_id = %message_id, heart_beat = %timestamp, "Heartbeat sent");
                notification.record_heart_beat(Ok(Some(timestamp)));
                Ok(Some(timestamp))
            }
            Ok(None) => {
                warn!(message_id = %message_id, "Heartbeat lease lost");
                notification.record_heart_beat(Ok(None));
                Ok(None)
            }
            Err(e) => {
                notification.record_heart_beat(Err(e.to_string()));
                Err(e)
            }
        }
    }

    pub(crate) fn is_configured(&self) -> bool {
        self.store.is_heart_beat_configured()
    }
}
