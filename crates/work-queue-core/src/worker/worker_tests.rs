//! Tests for the worker pool.

use super::*;
use crate::config::ConsumerConfiguration;
use crate::error::{HandlerError, ProcessingError};
use crate::error_handling::{ReceiveMessagesError, ReceivePoisonMessage};
use crate::error_type::INDEX_OUT_OF_RANGE;
use crate::handler::{FnHandler, MessageHandler};
use crate::message::{headers, Message, QueueStatus, ReceivedMessage};
use crate::providers::InMemoryTransport;
use crate::scheduler::SemaphoreTaskScheduler;
use crate::transport::SendMessages;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

fn worker_configuration() -> WorkerConfiguration {
    WorkerConfiguration {
        worker_count: 2,
        time_to_wait_for_workers_to_stop: Duration::from_millis(200),
        time_to_wait_for_workers_to_cancel: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

fn workers_for<H: MessageHandler>(
    transport: &Arc<InMemoryTransport>,
    handler: H,
    configuration: WorkerConfiguration,
    configure: impl FnOnce(&mut ConsumerConfiguration),
) -> WorkerCollection {
    workers_with(transport.clone(), transport, handler, configuration, 4, configure)
}

fn workers_with<H: MessageHandler>(
    receive: Arc<dyn ReceiveMessages>,
    transport: &Arc<InMemoryTransport>,
    handler: H,
    configuration: WorkerConfiguration,
    maximum_tasks: usize,
    configure: impl FnOnce(&mut ConsumerConfiguration),
) -> WorkerCollection {
    let mut consumer_configuration = ConsumerConfiguration::new();
    consumer_configuration.heart_beat.enabled = false;
    configure(&mut consumer_configuration);
    let frozen = consumer_configuration.freeze().unwrap();

    let scheduler = Arc::new(SemaphoreTaskScheduler::new(maximum_tasks, false));
    scheduler.start().unwrap();

    let processor = Arc::new(MessageProcessor {
        handler: Arc::new(handler),
        commit: transport.clone(),
        rollback: transport.clone(),
        receive_error: ReceiveMessagesError::new(frozen, transport.clone()),
        poison: ReceivePoisonMessage::new(transport.clone()),
        heart_beat: None,
    });

    WorkerCollection::new(
        configuration,
        receive,
        transport.clone(),
        scheduler,
        None,
        processor,
    )
}

fn succeeding() -> impl MessageHandler {
    FnHandler::new(|_: ReceivedMessage, _: WorkerNotification| async { Ok(()) })
}

async fn send(transport: &InMemoryTransport, body: &'static str) -> crate::message::MessageId {
    transport
        .send_message(&Message::new(Bytes::from_static(body.as_bytes())))
        .await
        .unwrap()
}

/// Records which worker task called `receive_message`
struct RecordingReceive {
    inner: Arc<InMemoryTransport>,
    callers: Mutex<HashSet<tokio::task::Id>>,
}

impl RecordingReceive {
    fn new(inner: Arc<InMemoryTransport>) -> Self {
        Self {
            inner,
            callers: Mutex::new(HashSet::new()),
        }
    }

    fn callers(&self) -> usize {
        lock(&self.callers).len()
    }

    fn clear(&self) {
        lock(&self.callers).clear();
    }
}

#[async_trait]
impl ReceiveMessages for RecordingReceive {
    async fn receive_message(
        &self,
        context: &MessageContext,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        if let Some(id) = tokio::task::try_id() {
            lock(&self.callers).insert(id);
        }
        // Let woken workers reach the claim before this one finishes
        tokio::task::yield_now().await;
        self.inner.receive_message(context).await
    }
}

/// Poll `condition` until it holds or five seconds pass
async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_second_start_fails() {
        let transport = Arc::new(InMemoryTransport::default());
        let workers = workers_for(&transport, succeeding(), worker_configuration(), |_| {});

        workers.start().unwrap();

        assert!(matches!(
            workers.start(),
            Err(QueueError::AlreadyStarted { .. })
        ));
        assert_eq!(workers.state(), WorkerState::Started);
        workers.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_after_dispose_fails() {
        let transport = Arc::new(InMemoryTransport::default());
        let workers = workers_for(&transport, succeeding(), worker_configuration(), |_| {});

        workers.dispose();
        workers.dispose();

        assert!(workers.is_disposed());
        assert!(matches!(workers.start(), Err(QueueError::Disposed { .. })));
        assert!(matches!(workers.stop().await, Err(QueueError::Disposed { .. })));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_not_running() {
        let transport = Arc::new(InMemoryTransport::default());
        let workers = workers_for(&transport, succeeding(), worker_configuration(), |_| {});

        assert_eq!(workers.stop().await.unwrap(), StopOutcome::NotRunning);
        assert_eq!(workers.state(), WorkerState::Stopped);
    }
}

mod processing {
    use super::*;

    #[tokio::test]
    async fn test_messages_are_processed_and_committed() {
        // Arrange
        let transport = Arc::new(InMemoryTransport::default());
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();
        let handler = FnHandler::new(move |_: ReceivedMessage, _: WorkerNotification| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let workers = workers_for(&transport, handler, worker_configuration(), |_| {});
        for body in ["a", "b", "c"] {
            send(&transport, body).await;
        }

        // Act
        workers.start().unwrap();
        let drained = eventually(|| transport.message_count() == 0).await;
        let outcome = workers.stop().await.unwrap();

        // Assert
        assert!(drained);
        assert_eq!(handled.load(Ordering::SeqCst), 3);
        assert_eq!(outcome, StopOutcome::Graceful);
        assert_eq!(workers.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_message_is_rolled_back_for_retry() {
        let transport = Arc::new(InMemoryTransport::default());
        let handler = FnHandler::new(|_: ReceivedMessage, _: WorkerNotification| async {
            Err::<(), ProcessingError>(HandlerError::new(&INDEX_OUT_OF_RANGE, "index 3").into())
        });
        let workers = workers_for(&transport, handler, worker_configuration(), |c| {
            c.retry_delay
                .add(&INDEX_OUT_OF_RANGE, vec![Duration::from_secs(60)])
                .unwrap();
        });
        let id = send(&transport, "retry me").await;

        workers.start().unwrap();
        let rolled_back = eventually(|| {
            transport.status(&id) == Some(QueueStatus::Waiting)
                && transport.delivery_count(&id) == Some(1)
        })
        .await;
        workers.stop().await.unwrap();

        assert!(rolled_back);
        assert_eq!(transport.error_queue_len(), 0);
    }

    #[tokio::test]
    async fn test_poison_message_is_moved_to_error_queue() {
        let transport = Arc::new(InMemoryTransport::default());
        let workers = workers_for(&transport, succeeding(), worker_configuration(), |_| {});
        let id = transport
            .send_message(
                &Message::new(Bytes::from_static(b"x")).with_header(headers::EXPIRATION, "never"),
            )
            .await
            .unwrap();

        workers.start().unwrap();
        let moved = eventually(|| transport.status(&id) == Some(QueueStatus::Error)).await;
        workers.stop().await.unwrap();

        assert!(moved);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_treated_as_failure() {
        let transport = Arc::new(InMemoryTransport::default());
        let handler = FnHandler::new(|message: ReceivedMessage, _: WorkerNotification| async move {
            if message.body_str() == Some("explode") {
                panic!("handler exploded");
            }
            Ok(())
        });
        let workers = workers_for(&transport, handler, worker_configuration(), |_| {});
        let id = send(&transport, "explode").await;

        workers.start().unwrap();
        let moved = eventually(|| transport.status(&id) == Some(QueueStatus::Error)).await;
        workers.stop().await.unwrap();

        assert!(moved);
        assert!(transport.error_records()[0].reason.contains("handler exploded"));
    }
}

mod stopping {
    use super::*;

    #[tokio::test]
    async fn test_handler_observing_cancel_token_is_cancelled() {
        // Arrange
        let transport = Arc::new(InMemoryTransport::default());
        let handler = FnHandler::new(|_: ReceivedMessage, notification: WorkerNotification| async move {
            notification.cancel_work_token().cancelled().await;
            Ok(())
        });
        let workers = workers_for(&transport, handler, worker_configuration(), |_| {});
        send(&transport, "long").await;

        // Act
        workers.start().unwrap();
        assert!(eventually(|| transport.processing_count() == 1).await);
        let outcome = workers.stop().await.unwrap();

        // Assert
        assert_eq!(outcome, StopOutcome::Cancelled);
        assert!(workers.worker_notification().is_cancelled());
    }

    #[tokio::test]
    async fn test_unresponsive_handler_is_detached() {
        let transport = Arc::new(InMemoryTransport::default());
        let handler = FnHandler::new(|_: ReceivedMessage, _: WorkerNotification| async {
            std::future::pending::<()>().await;
            Ok(())
        });
        let workers = workers_for(&transport, handler, worker_configuration(), |_| {});
        send(&transport, "stuck").await;

        workers.start().unwrap();
        assert!(eventually(|| workers.in_flight() == 1).await);
        let outcome = workers.stop().await.unwrap();

        assert_eq!(outcome, StopOutcome::Detached);
        assert_eq!(workers.state(), WorkerState::Stopped);
    }
}

mod idle_polling {
    use super::*;

    fn parking_configuration() -> WorkerConfiguration {
        WorkerConfiguration {
            worker_count: 4,
            single_worker_when_no_work_found: true,
            poll_interval: Duration::from_millis(20),
            ..worker_configuration()
        }
    }

    #[tokio::test]
    async fn test_only_one_worker_polls_an_empty_queue() {
        // Arrange
        let transport = Arc::new(InMemoryTransport::default());
        let receive = Arc::new(RecordingReceive::new(transport.clone()));
        let workers = workers_with(
            receive.clone(),
            &transport,
            succeeding(),
            parking_configuration(),
            4,
            |_| {},
        );

        // Act
        workers.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        receive.clear();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let idle_callers = receive.callers();
        workers.stop().await.unwrap();

        // Assert
        assert_eq!(idle_callers, 1);
    }

    #[tokio::test]
    async fn test_parked_workers_wake_when_work_is_found() {
        // Arrange
        let transport = Arc::new(InMemoryTransport::default());
        let receive = Arc::new(RecordingReceive::new(transport.clone()));
        let workers = workers_with(
            receive.clone(),
            &transport,
            succeeding(),
            parking_configuration(),
            4,
            |_| {},
        );
        workers.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        receive.clear();

        // Act
        send(&transport, "wake up").await;
        let all_polled = eventually(|| receive.callers() == 4).await;
        workers.stop().await.unwrap();

        // Assert
        assert!(all_polled);
        assert_eq!(transport.message_count(), 0);
    }

    #[tokio::test]
    async fn test_every_worker_polls_when_parking_is_off() {
        let transport = Arc::new(InMemoryTransport::default());
        let receive = Arc::new(RecordingReceive::new(transport.clone()));
        let configuration = WorkerConfiguration {
            single_worker_when_no_work_found: false,
            ..parking_configuration()
        };
        let workers = workers_with(receive.clone(), &transport, succeeding(), configuration, 4, |_| {});

        workers.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        receive.clear();
        let all_polled = eventually(|| receive.callers() == 4).await;
        workers.stop().await.unwrap();

        assert!(all_polled);
    }
}

mod capacity {
    use super::*;

    #[tokio::test]
    async fn test_claimed_messages_never_exceed_maximum_tasks() {
        // Arrange
        let transport = Arc::new(InMemoryTransport::default());
        let peak = Arc::new(AtomicUsize::new(0));
        let observed = peak.clone();
        let store = transport.clone();
        let handler = FnHandler::new(move |_: ReceivedMessage, _: WorkerNotification| {
            let observed = observed.clone();
            let store = store.clone();
            async move {
                observed.fetch_max(store.processing_count(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            }
        });
        let configuration = WorkerConfiguration {
            worker_count: 4,
            ..worker_configuration()
        };
        let workers = workers_with(transport.clone(), &transport, handler, configuration, 2, |_| {});
        for _ in 0..10 {
            send(&transport, "job").await;
        }

        // Act
        workers.start().unwrap();
        let drained = eventually(|| {
            peak.fetch_max(transport.processing_count(), Ordering::SeqCst);
            transport.message_count() == 0
        })
        .await;
        workers.stop().await.unwrap();

        // Assert
        assert!(drained);
        assert!(peak.load(Ordering::SeqCst) <= 2, "peak was {}", peak.load(Ordering::SeqCst));
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_single_slot_processes_each_message_once() {
        let transport = Arc::new(InMemoryTransport::default());
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();
        let handler = FnHandler::new(move |_: ReceivedMessage, _: WorkerNotification| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(())
            }
        });
        let workers = workers_with(transport.clone(), &transport, handler, worker_configuration(), 1, |_| {});
        for _ in 0..10 {
            send(&transport, "job").await;
        }

        workers.start().unwrap();
        let drained = eventually(|| {
            assert!(transport.processing_count() <= 1);
            transport.message_count() == 0
        })
        .await;
        workers.stop().await.unwrap();

        assert!(drained);
        assert_eq!(handled.load(Ordering::SeqCst), 10);
    }
}
