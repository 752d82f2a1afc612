use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{DecodeError, ProjectionError};

/// Per-message handler failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandleError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl HandleError {
    /// Retrying a malformed message cannot succeed; retrying a store failure might.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Projection(ProjectionError::Store { .. }))
    }
}

/// Consumer-side seam between a transport and the code that processes its messages.
///
/// A transport calls `handle` once per delivered message and decides about
/// acknowledgement from the result.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), HandleError>;
}

#[async_trait]
impl<H> MessageHandler for Arc<H>
where
    H: MessageHandler + ?Sized,
{
    async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), HandleError> {
        (**self).handle(topic, payload).await
    }
}
