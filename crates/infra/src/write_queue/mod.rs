//! Write-serialization queue.
//!
//! Command handlers hand writes to a [`WriteQueue`] instead of touching the
//! store. The queue orders them (priority, then arrival), groups them into
//! bounded batches, commits each batch in one transaction and retries the
//! ones that hit transient store errors. Only one transaction is open at a
//! time.
//!
//! ```text
//! WriteFacade / enqueue ──► PendingQueue ──► scheduler tick / flush
//!                                                  │
//!                                   TransactionExecutor (one tx per batch)
//!                                                  │ failure
//!                                           RetryCoordinator ──► requeue / fail
//! ```

pub mod completion;
pub mod error;
pub mod executor;
pub mod facade;
pub mod operation;
mod pending;
pub mod queue;
pub mod retry;
mod scheduler;
pub mod status;

pub use completion::Completion;
pub use error::{WriteQueueError, WriteQueueResult};
pub use executor::{BatchFailure, TransactionExecutor};
pub use facade::WriteFacade;
pub use operation::{
    Mutation, OperationId, OperationKind, OperationRequest, OperationStatus, Payload, Selector,
    Target, Write, priority,
};
pub use queue::WriteQueue;
pub use retry::RetryPolicy;
pub use status::{DrainReport, QueueStatus};
