//! User message handler contract.

use crate::context::WorkerNotification;
use crate::error::ProcessingError;
use crate::message::ReceivedMessage;
use async_trait::async_trait;
use std::future::Future;

/// Processes one dequeued message.
///
/// Returning `Ok` commits the message. A [`ProcessingError::Handler`] is
/// classified against the retry delay registry; a
/// [`ProcessingError::Poison`] moves the message straight to the error queue.
/// Long running handlers should observe the tokens on `notification`.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        message: &ReceivedMessage,
        notification: &WorkerNotification,
    ) -> Result<(), ProcessingError>;
}

/// Adapts an async closure to [`MessageHandler`]
pub struct FnHandler<F> {
    handler: F,
}

impl<F> FnHandler<F> {
    pub fn new<Fut>(handler: F) -> Self
    where
        F: Fn(ReceivedMessage, WorkerNotification) -> Fut,
        Fut: Future<Output = Result<(), ProcessingError>>,
    {
        Self { handler }
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(ReceivedMessage, WorkerNotification) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessingError>> + Send,
{
    async fn handle(
        &self,
        message: &ReceivedMessage,
        notification: &WorkerNotification,
    ) -> Result<(), ProcessingError> {
        (self.handler)(message.clone(), notification.clone()).await
    }
}
