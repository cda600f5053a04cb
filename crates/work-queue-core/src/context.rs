//! Per-message processing state.
//!
//! A [`MessageContext`] is created for every dequeue attempt and disposed once
//! the attempt has been committed or rolled back. It carries the message
//! identity, headers, the worker's cancellation signals and typed additional
//! data attached by the engine or the handler.

use crate::error::QueueError;
use crate::message::{CorrelationId, MessageHeaders, MessageId, ReceivedMessage, Timestamp};
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

// ============================================================================
// Typed Context Data
// ============================================================================

/// Typed descriptor for a piece of additional context data
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Delay to apply when the current attempt is rolled back
pub static QUEUE_DELAY: ContextKey<Duration> = ContextKey::new("queue-delay");

// ============================================================================
// Worker Notification
// ============================================================================

/// Latest heartbeat outcome for an in-flight message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartBeatStatus {
    pub last_heart_beat: Option<Timestamp>,
    /// The transport no longer considers this worker the owner of the message
    pub lease_lost: bool,
    pub last_error: Option<String>,
}

/// Signals shared between a worker pool and the handlers it runs.
///
/// `stop_work_token` asks handlers to finish the current message and exit;
/// `cancel_work_token` asks them to abandon work as soon as possible.
#[derive(Debug, Clone)]
pub struct WorkerNotification {
    stop_work_token: CancellationToken,
    cancel_work_token: CancellationToken,
    heart_beat: Arc<Mutex<HeartBeatStatus>>,
}

impl WorkerNotification {
    pub fn new(stop_work_token: CancellationToken, cancel_work_token: CancellationToken) -> Self {
        Self {
            stop_work_token,
            cancel_work_token,
            heart_beat: Arc::new(Mutex::new(HeartBeatStatus::default())),
        }
    }

    /// Copy sharing the tokens but with its own heartbeat status
    pub fn for_message(&self) -> Self {
        Self::new(
            self.stop_work_token.clone(),
            self.cancel_work_token.clone(),
        )
    }

    pub fn stop_work_token(&self) -> &CancellationToken {
        &self.stop_work_token
    }

    pub fn cancel_work_token(&self) -> &CancellationToken {
        &self.cancel_work_token
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_work_token.is_cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_work_token.is_cancelled()
    }

    pub fn heart_beat(&self) -> HeartBeatStatus {
        lock(&self.heart_beat).clone()
    }

    pub(crate) fn record_heart_beat(&self, result: Result<Option<Timestamp>, String>) {
        let mut status = lock(&self.heart_beat);
        match result {
            Ok(Some(timestamp)) => {
                status.last_heart_beat = Some(timestamp);
                status.last_error = None;
            }
            Ok(None) => status.lease_lost = true,
            Err(error) => status.last_error = Some(error),
        }
    }
}

impl Default for WorkerNotification {
    fn default() -> Self {
        Self::new(CancellationToken::new(), CancellationToken::new())
    }
}

// ============================================================================
// Message Context
// ============================================================================

type Callback = Box<dyn FnOnce(&MessageId) + Send>;

#[derive(Default)]
struct ContextState {
    message_id: Option<MessageId>,
    correlation_id: Option<CorrelationId>,
    headers: MessageHeaders,
    message: Option<ReceivedMessage>,
    data: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
    commit_callbacks: Vec<Callback>,
    rollback_callbacks: Vec<Callback>,
}

/// Scoped state for a single delivery attempt
pub struct MessageContext {
    state: Mutex<ContextState>,
    notification: WorkerNotification,
    disposed: AtomicBool,
}

impl MessageContext {
    /// Create an empty context for a receive attempt
    pub fn new(notification: WorkerNotification) -> Self {
        Self {
            state: Mutex::new(ContextState::default()),
            notification,
            disposed: AtomicBool::new(false),
        }
    }

    /// Populate the context from a dequeued message
    pub fn set_message(&self, message: ReceivedMessage) -> Result<(), QueueError> {
        self.ensure_live()?;
        let mut state = self.state();
        state.message_id = Some(message.message_id.clone());
        state.correlation_id = message.correlation_id.clone();
        state.headers = message.headers.clone();
        state.message = Some(message);
        Ok(())
    }

    /// Attach identity only, for messages that could not be decoded
    pub fn set_message_id(
        &self,
        message_id: MessageId,
        headers: MessageHeaders,
    ) -> Result<(), QueueError> {
        self.ensure_live()?;
        let mut state = self.state();
        state.correlation_id = headers.correlation_id();
        state.message_id = Some(message_id);
        state.headers = headers;
        Ok(())
    }

    /// Identifier of the in-flight message; has no value before receive
    pub fn message_id(&self) -> MessageId {
        self.state().message_id.clone().unwrap_or_else(MessageId::none)
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.state().correlation_id.clone()
    }

    pub fn headers(&self) -> MessageHeaders {
        self.state().headers.clone()
    }

    /// The dequeued message, unless it was cleared after an error queue move
    pub fn message(&self) -> Option<ReceivedMessage> {
        self.state().message.clone()
    }

    /// Drop payload and headers so nothing further can act on the message
    pub fn clear_message(&self) {
        let mut state = self.state();
        state.message = None;
        state.headers = MessageHeaders::new();
    }

    pub fn worker_notification(&self) -> &WorkerNotification {
        &self.notification
    }

    /// Attach typed data
    pub fn set<T>(&self, key: &ContextKey<T>, value: T) -> Result<(), QueueError>
    where
        T: Send + Sync + 'static,
    {
        self.ensure_live()?;
        self.state().data.insert(key.name, Box::new(value));
        Ok(())
    }

    /// Read typed data
    pub fn get<T>(&self, key: &ContextKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.state()
            .data
            .get(key.name)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn remove<T>(&self, key: &ContextKey<T>) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        let value = self.state().data.remove(key.name)?;
        value.downcast::<T>().ok().map(|boxed| *boxed)
    }

    /// Set the redelivery delay used if this attempt is rolled back
    pub fn set_queue_delay(&self, delay: Duration) -> Result<(), QueueError> {
        self.set(&QUEUE_DELAY, delay)
    }

    pub fn queue_delay(&self) -> Option<Duration> {
        self.get(&QUEUE_DELAY)
    }

    /// Register a callback invoked after a successful commit
    pub fn on_commit<F>(&self, callback: F) -> Result<(), QueueError>
    where
        F: FnOnce(&MessageId) + Send + 'static,
    {
        self.ensure_live()?;
        self.state().commit_callbacks.push(Box::new(callback));
        Ok(())
    }

    /// Register a callback invoked after a rollback
    pub fn on_rollback<F>(&self, callback: F) -> Result<(), QueueError>
    where
        F: FnOnce(&MessageId) + Send + 'static,
    {
        self.ensure_live()?;
        self.state().rollback_callbacks.push(Box::new(callback));
        Ok(())
    }

    pub(crate) fn raise_commit(&self) {
        let (id, callbacks) = {
            let mut state = self.state();
            state.rollback_callbacks.clear();
            (
                state.message_id.clone().unwrap_or_else(MessageId::none),
                std::mem::take(&mut state.commit_callbacks),
            )
        };
        for callback in callbacks {
            callback(&id);
        }
    }

    pub(crate) fn raise_rollback(&self) {
        let (id, callbacks) = {
            let mut state = self.state();
            state.commit_callbacks.clear();
            (
                state.message_id.clone().unwrap_or_else(MessageId::none),
                std::mem::take(&mut state.rollback_callbacks),
            )
        };
        for callback in callbacks {
            callback(&id);
        }
    }

    /// Render the context unusable. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state();
        state.data.clear();
        state.commit_callbacks.clear();
        state.rollback_callbacks.clear();
        state.message = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<(), QueueError> {
        if self.is_disposed() {
            return Err(QueueError::disposed("MessageContext"));
        }
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, ContextState> {
        lock(&self.state)
    }
}

impl std::fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContext")
            .field("message_id", &self.message_id())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
