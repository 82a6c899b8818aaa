//! Write queue error taxonomy.

use thiserror::Error;

use syndicate_core::DomainError;

use crate::store::StoreError;

pub type WriteQueueResult<T> = Result<T, WriteQueueError>;

/// Errors reported by the write queue.
///
/// `Validation` and `QueueFull` come back synchronously from `enqueue`; the
/// store variants only reach callers through `execute_now` or a tracked
/// [`Completion`](super::Completion).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteQueueError {
    /// The request was malformed; nothing was queued.
    #[error("invalid write request: {0}")]
    Validation(String),

    /// Backpressure: the queue already holds `capacity` outstanding operations.
    #[error("write queue is full ({capacity} operations outstanding)")]
    QueueFull { capacity: usize },

    #[error("transient store failure: {0}")]
    TransientStore(String),

    #[error("permanent store failure: {0}")]
    PermanentStore(String),

    /// Every attempt failed transiently.
    #[error("giving up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The queue was dropped before the operation reached a terminal state.
    #[error("write queue dropped before the operation completed")]
    Abandoned,
}

impl WriteQueueError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<DomainError> for WriteQueueError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => Self::Validation(msg),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<StoreError> for WriteQueueError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Transient(msg) => Self::TransientStore(msg),
            StoreError::Permanent(msg) => Self::PermanentStore(msg),
        }
    }
}
