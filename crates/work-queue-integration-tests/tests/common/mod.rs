//! Common test utilities for work-queue integration tests
//!
//! This module provides:
//! - A fast consumer configuration with every monitor switched off
//! - Polling helpers for asserting on background work
//! - Handlers that record what they saw

use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use work_queue_core::transport::SendMessages;
use work_queue_core::{
    ConsumerConfiguration, InMemoryTransport, Message, MessageId, ProcessingError,
    ReceivedMessage, WorkerNotification,
};

/// Configuration tuned for tests: quick polling, short grace periods and no
/// background monitors unless a test turns them on
#[allow(dead_code)]
pub fn fast_configuration() -> ConsumerConfiguration {
    let mut configuration = ConsumerConfiguration::new();
    configuration.worker.worker_count = 2;
    configuration.worker.poll_interval = Duration::from_millis(10);
    configuration.worker.time_to_wait_for_workers_to_stop = Duration::from_secs(1);
    configuration.worker.time_to_wait_for_workers_to_cancel = Duration::from_secs(1);
    configuration.heart_beat.enabled = false;
    configuration.message_expiration.enabled = false;
    configuration.message_error.enabled = false;
    configuration
}

/// Poll `condition` every 10ms for up to five seconds
#[allow(dead_code)]
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[allow(dead_code)]
pub async fn send_text(transport: &InMemoryTransport, body: &'static str) -> MessageId {
    transport
        .send_message(&Message::new(Bytes::from_static(body.as_bytes())))
        .await
        .unwrap()
}

/// Counts invocations and remembers every delivery
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct Recorder {
    calls: Arc<AtomicUsize>,
    deliveries: Arc<Mutex<Vec<ReceivedMessage>>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn record(&self, message: &ReceivedMessage) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.deliveries.lock().unwrap().push(message.clone());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn deliveries(&self) -> Vec<ReceivedMessage> {
        self.deliveries.lock().unwrap().clone()
    }
}

/// Handler body that succeeds after recording the delivery
#[allow(dead_code)]
pub async fn record_and_succeed(
    recorder: Recorder,
    message: ReceivedMessage,
    _notification: WorkerNotification,
) -> Result<(), ProcessingError> {
    recorder.record(&message);
    Ok(())
}
