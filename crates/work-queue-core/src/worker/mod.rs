//! Worker pool pulling messages from a transport.
//!
//! A [`WorkerCollection`] runs `worker_count` pull loops. Each loop asks the
//! scheduler for room, dequeues one message, and submits its processing to
//! the scheduler. Handlers never run on the pull loop itself, so a slow
//! handler only ever occupies a scheduler slot.
//!
//! Stopping escalates: the stop token asks handlers to finish, then the
//! cancel token asks them to abandon work. Work still running after both
//! grace periods is either detached or awaited, depending on
//! `abort_worker_threads_when_stopping`.

mod processor;

pub(crate) use processor::MessageProcessor;

use crate::config::WorkerConfiguration;
use crate::context::{lock, MessageContext, WorkerNotification};
use crate::error::{PoisonMessageError, QueueError};
use crate::scheduler::{RoomForNewTask, TaskScheduler, WorkGroup};
use crate::transport::{ReceiveMessages, RollbackMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

/// Lifecycle of a worker collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Started,
    Stopping,
    Stopped,
    Disposed,
}

/// How a stop request finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Everything finished within the stop grace period
    Graceful,
    /// Everything finished after the cancel token fired
    Cancelled,
    /// Work was still running after both grace periods and was detached
    Detached,
    /// The collection was never started
    NotRunning,
}

struct WorkerShared {
    configuration: WorkerConfiguration,
    receive: Arc<dyn ReceiveMessages>,
    rollback: Arc<dyn RollbackMessage>,
    scheduler: Arc<dyn TaskScheduler>,
    work_group: Option<WorkGroup>,
    processor: Arc<MessageProcessor>,
    notification: WorkerNotification,
    in_flight: TaskTracker,
    /// Set while one idle worker is polling on behalf of the others
    idle_poller: AtomicBool,
    work_found: Notify,
    /// Held from the room check until the claimed message is scheduled
    claim: AsyncMutex<()>,
}

/// Fixed pool of message pull loops
pub struct WorkerCollection {
    shared: Arc<WorkerShared>,
    state: Mutex<WorkerState>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerCollection {
    pub(crate) fn new(
        configuration: WorkerConfiguration,
        receive: Arc<dyn ReceiveMessages>,
        rollback: Arc<dyn RollbackMessage>,
        scheduler: Arc<dyn TaskScheduler>,
        work_group: Option<WorkGroup>,
        processor: Arc<MessageProcessor>,
    ) -> Self {
        Self {
            shared: Arc::new(WorkerShared {
                configuration,
                receive,
                rollback,
                scheduler,
                work_group,
                processor,
                notification: WorkerNotification::default(),
                in_flight: TaskTracker::new(),
                idle_poller: AtomicBool::new(false),
                work_found: Notify::new(),
                claim: AsyncMutex::new(()),
            }),
            state: Mutex::new(WorkerState::Created),
            loops: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> WorkerState {
        *lock(&self.state)
    }

    /// Tokens shared with every handler started by this collection
    pub fn worker_notification(&self) -> &WorkerNotification {
        &self.shared.notification
    }

    /// Messages currently being processed or waiting for a scheduler slot
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.len()
    }

    /// Spawn the pull loops. May only be called once.
    pub fn start(&self) -> Result<(), QueueError> {
        {
            let mut state = lock(&self.state);
            match *state {
                WorkerState::Created => *state = WorkerState::Started,
                WorkerState::Disposed => return Err(QueueError::disposed("WorkerCollection")),
                _ => return Err(QueueError::already_started("WorkerCollection")),
            }
        }

        let count = self.shared.configuration.worker_count.max(1);
        let mut loops = lock(&self.loops);
        for index in 0..count {
            loops.push(tokio::spawn(pull_loop(self.shared.clone(), index)));
        }
        info!(worker_count = count, "Workers started");
        Ok(())
    }

    /// Stop the pool, escalating from stop to cancel to detach.
    pub async fn stop(&self) -> Result<StopOutcome, QueueError> {
        {
            let mut state = lock(&self.state);
            match *state {
                WorkerState::Started => *state = WorkerState::Stopping,
                WorkerState::Created | WorkerState::Stopped => {
                    *state = WorkerState::Stopped;
                    return Ok(StopOutcome::NotRunning);
                }
                WorkerState::Stopping => return Ok(StopOutcome::NotRunning),
                WorkerState::Disposed => return Err(QueueError::disposed("WorkerCollection")),
            }
        }

        let configuration = &self.shared.configuration;
        let notification = &self.shared.notification;
        let loops: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&self.loops));
        let abort_handles: Vec<_> = loops.iter().map(|h| h.abort_handle()).collect();

        let in_flight = self.shared.in_flight.clone();
        let drained = async move {
            futures::future::join_all(loops).await;
            in_flight.close();
            in_flight.wait().await;
        };
        tokio::pin!(drained);

        info!("Stopping workers");
        notification.stop_work_token().cancel();
        self.shared.work_found.notify_waiters();

        let outcome = if tokio::time::timeout(
            configuration.time_to_wait_for_workers_to_stop,
            &mut drained,
        )
        .await
        .is_ok()
        {
            StopOutcome::Graceful
        } else {
            warn!(
                in_flight = self.in_flight(),
                "Workers did not stop in time; cancelling work"
            );
            notification.cancel_work_token().cancel();

            if tokio::time::timeout(
                configuration.time_to_wait_for_workers_to_cancel,
                &mut drained,
            )
            .await
            .is_ok()
            {
                StopOutcome::Cancelled
            } else if configuration.abort_worker_threads_when_stopping {
                for handle in abort_handles {
                    handle.abort();
                }
                error!(
                    in_flight = self.in_flight(),
                    "Workers did not cancel in time; detaching remaining work"
                );
                StopOutcome::Detached
            } else {
                warn!("Workers did not cancel in time; waiting for them to finish");
                drained.await;
                StopOutcome::Cancelled
            }
        };

        *lock(&self.state) = WorkerState::Stopped;
        info!(outcome = ?outcome, "Workers stopped");
        Ok(outcome)
    }

    /// Cancel everything immediately. Idempotent.
    pub fn dispose(&self) {
        {
            let mut state = lock(&self.state);
            if *state == WorkerState::Disposed {
                return;
            }
            *state = WorkerState::Disposed;
        }

        self.shared.notification.stop_work_token().cancel();
        self.shared.notification.cancel_work_token().cancel();
        self.shared.work_found.notify_waiters();
        for handle in lock(&self.loops).drain(..) {
            handle.abort();
        }
        self.shared.in_flight.close();
        debug!("Workers disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == WorkerState::Disposed
    }
}

impl Drop for WorkerCollection {
    fn drop(&mut self) {
        self.shared.notification.stop_work_token().cancel();
        for handle in lock(&self.loops).drain(..) {
            handle.abort();
        }
    }
}

// ============================================================================
// Pull Loop
// ============================================================================

async fn pull_loop(shared: Arc<WorkerShared>, index: usize) {
    let stop = shared.notification.stop_work_token().clone();
    let mut polling_for_others = false;
    debug!(worker = index, "Worker loop started");

    loop {
        if stop.is_cancelled() {
            break;
        }

        match room_for_task(&shared) {
            RoomForNewTask::RoomForTask => {}
            RoomForNewTask::NoRoom => {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = shared.scheduler.wait_for_room(shared.work_group.as_ref()) => continue,
                }
            }
            RoomForNewTask::Unavailable => {
                debug!(worker = index, "Scheduler unavailable; worker exiting");
                break;
            }
        }

        if shared.configuration.single_worker_when_no_work_found
            && !polling_for_others
            && shared.idle_poller.load(Ordering::SeqCst)
        {
            let found = shared.work_found.notified();
            tokio::pin!(found);
            found.as_mut().enable();
            if shared.idle_poller.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = &mut found => {}
                }
            }
            continue;
        }

        let claim = tokio::select! {
            _ = stop.cancelled() => break,
            claim = shared.claim.lock() => claim,
        };
        // Another worker may have filled the last slot meanwhile
        if room_for_task(&shared) != RoomForNewTask::RoomForTask {
            continue;
        }

        let context = MessageContext::new(shared.notification.for_message());
        match shared.receive.receive_message(&context).await {
            Ok(Some(message)) => {
                if polling_for_others {
                    polling_for_others = false;
                    shared.idle_poller.store(false, Ordering::SeqCst);
                    shared.work_found.notify_waiters();
                }
                dispatch(&shared, context, message).await;
                drop(claim);
            }
            Ok(None) => {
                drop(claim);
                context.dispose();
                if shared.configuration.single_worker_when_no_work_found && !polling_for_others {
                    polling_for_others = shared
                        .idle_poller
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok();
                    if !polling_for_others {
                        continue;
                    }
                }
                if !idle(&shared, &stop).await {
                    break;
                }
            }
            Err(QueueError::PoisonMessage {
                message_id,
                headers,
                reason,
            }) => {
                drop(claim);
                warn!(worker = index, message_id = %message_id, reason = %reason, "Received poison message");
                if context.set_message_id(message_id, headers).is_ok() {
                    shared
                        .processor
                        .poisoned(&context, PoisonMessageError::new(reason))
                        .await;
                }
                context.dispose();
            }
            Err(e) => {
                drop(claim);
                context.dispose();
                error!(worker = index, error = %e, "Failed to receive message");
                if !idle(&shared, &stop).await {
                    break;
                }
            }
        }
    }

    if polling_for_others {
        shared.idle_poller.store(false, Ordering::SeqCst);
        shared.work_found.notify_waiters();
    }
    debug!(worker = index, "Worker loop exited");
}

fn room_for_task(shared: &WorkerShared) -> RoomForNewTask {
    match &shared.work_group {
        Some(group) => shared.scheduler.room_for_new_work_group_task(group),
        None => shared.scheduler.room_for_new_task(),
    }
}

/// Wait before polling again; returns false when the worker should exit
async fn idle(shared: &WorkerShared, stop: &CancellationToken) -> bool {
    if shared.receive.is_blocking_operation() {
        return !stop.is_cancelled();
    }
    tokio::select! {
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(shared.configuration.poll_interval) => true,
    }
}

async fn dispatch(
    shared: &Arc<WorkerShared>,
    context: MessageContext,
    message: crate::message::ReceivedMessage,
) {
    let message_id = message.message_id.clone();
    if let Err(e) = context.set_message(message) {
        warn!(message_id = %message_id, error = %e, "Context rejected message");
        return;
    }

    // The lease is renewed from the moment of the claim, while the message
    // waits for a scheduler slot as well as while it is handled
    let context = Arc::new(context);
    let heart_beat = shared.processor.start_heart_beat(&context);

    let processor = shared.processor.clone();
    let token = shared.in_flight.token();
    let task = Box::pin(async move {
        processor.process(context, heart_beat).await;
        drop(token);
    });

    if let Err(e) = shared
        .scheduler
        .add_task(shared.work_group.as_ref(), task)
    {
        warn!(message_id = %message_id, error = %e, "Scheduler rejected message; rolling back");
        if let Err(e) = shared.rollback.rollback_message(&message_id, None).await {
            error!(message_id = %message_id, error = %e, "Failed to roll back rejected message");
        }
    }
}
