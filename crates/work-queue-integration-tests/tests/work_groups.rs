//! Integration tests for consumers sharing a scheduler
//!
//! These tests verify:
//! - A work group caps concurrency across every consumer placed in it
//! - Registering the same group twice yields the same partition

mod common;

use common::{eventually, fast_configuration, send_text};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use work_queue_core::{
    FnHandler, InMemoryTransport, ProcessingError, QueueConsumer, ReceivedMessage,
    SemaphoreTaskScheduler, StopOutcome, TaskScheduler, WorkerNotification,
};

/// Tracks how many handlers run at the same time
#[derive(Clone, Default)]
struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    fn handler(&self) -> impl work_queue_core::MessageHandler {
        let probe = self.clone();
        FnHandler::new(move |_: ReceivedMessage, _: WorkerNotification| {
            let probe = probe.clone();
            async move {
                let running = probe.current.fetch_add(1, Ordering::SeqCst) + 1;
                probe.peak.fetch_max(running, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                probe.current.fetch_sub(1, Ordering::SeqCst);
                probe.completed.fetch_add(1, Ordering::SeqCst);
                Ok::<(), ProcessingError>(())
            }
        })
    }
}

#[tokio::test]
async fn test_work_group_limits_concurrency_across_consumers() {
    // Arrange: two consumers with two workers each, one group of width one
    let transport = Arc::new(InMemoryTransport::default());
    for _ in 0..6 {
        send_text(&transport, "report").await;
    }
    let scheduler = Arc::new(SemaphoreTaskScheduler::new(8, true));
    scheduler.start().unwrap();
    let first_group = scheduler.add_work_group("reports", 1, 0).unwrap();
    let second_group = scheduler.add_work_group("reports", 1, 0).unwrap();
    assert_eq!(first_group, second_group);

    let probe = ConcurrencyProbe::default();
    let consumers = [
        QueueConsumer::with_scheduler(
            fast_configuration().freeze().unwrap(),
            transport.clone(),
            probe.handler(),
            scheduler.clone(),
            Some(first_group),
        ),
        QueueConsumer::with_scheduler(
            fast_configuration().freeze().unwrap(),
            transport.clone(),
            probe.handler(),
            scheduler.clone(),
            Some(second_group),
        ),
    ];

    // Act
    for consumer in &consumers {
        consumer.start().unwrap();
    }
    let drained = eventually(|| probe.completed.load(Ordering::SeqCst) == 6).await;
    let mut outcomes = Vec::new();
    for consumer in &consumers {
        outcomes.push(consumer.stop().await.unwrap());
        consumer.dispose();
    }
    scheduler.shutdown().await;

    // Assert
    assert!(drained);
    assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    assert_eq!(transport.message_count(), 0);
    assert!(outcomes.iter().all(|o| *o == StopOutcome::Graceful));
}

#[tokio::test]
async fn test_ungrouped_consumers_run_in_parallel() {
    // Arrange
    let transport = Arc::new(InMemoryTransport::default());
    for _ in 0..8 {
        send_text(&transport, "report").await;
    }
    let scheduler = Arc::new(SemaphoreTaskScheduler::new(4, true));
    scheduler.start().unwrap();
    let probe = ConcurrencyProbe::default();
    let mut configuration = fast_configuration();
    configuration.worker.worker_count = 4;
    configuration.worker.single_worker_when_no_work_found = false;
    let consumer = QueueConsumer::with_scheduler(
        configuration.freeze().unwrap(),
        transport.clone(),
        probe.handler(),
        scheduler.clone(),
        None,
    );

    // Act
    consumer.start().unwrap();
    let drained = eventually(|| probe.completed.load(Ordering::SeqCst) == 8).await;
    consumer.stop().await.unwrap();
    scheduler.shutdown().await;

    // Assert
    assert!(drained);
    assert!(probe.peak.load(Ordering::SeqCst) <= 4);
    assert!(probe.peak.load(Ordering::SeqCst) >= 1);
}
