//! The write queue handle: admission, batch execution and status.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::{ConfigError, WriteQueueConfig};
use crate::store::GameStore;

use super::completion::{self, Completion, CompletionSender};
use super::error::{WriteQueueError, WriteQueueResult};
use super::executor::TransactionExecutor;
use super::operation::{
    Mutation, Operation, OperationId, OperationRequest, OperationStatus, priority,
};
use super::pending::PendingQueue;
use super::retry::{RetryCoordinator, RetryPolicy};
use super::scheduler::SchedulerHandle;
use super::status::QueueStatus;

/// Serializes game writes through a single-writer store.
///
/// Cheap to clone; every clone drives the same queue. Construct one at
/// startup and hand clones to command handlers.
#[derive(Clone)]
pub struct WriteQueue {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub config: WriteQueueConfig,
    pub executor: TransactionExecutor,
    pub retry: RetryCoordinator,
    pub state: Mutex<QueueState>,
    /// Held for the whole of every transaction the queue runs.
    pub gate: Arc<tokio::sync::Mutex<()>>,
    pub scheduler: Mutex<Option<SchedulerHandle>>,
}

/// Ownership of the execution gate. Whoever holds it may open a transaction.
pub(crate) type GateGuard = OwnedMutexGuard<()>;

impl Inner {
    pub fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn acquire_gate(&self) -> GateGuard {
        Arc::clone(&self.gate).lock_owned().await
    }

    pub fn try_acquire_gate(&self) -> Option<GateGuard> {
        Arc::clone(&self.gate).try_lock_owned().ok()
    }

    /// Run a selected batch to completion and settle every operation in it.
    async fn execute_batch(&self, batch: Vec<Operation>) -> BatchOutcome {
        let size = batch.len();
        let result = {
            let mutations: Vec<&Mutation> = batch.iter().map(|op| &op.mutation).collect();
            self.executor.execute(&mutations).await
        };

        let mut state = self.lock_state();
        state.in_flight -= size;
        state.batches_executed += 1;
        match result {
            Ok(()) => {
                state.succeeded_total += size as u64;
                for mut op in batch {
                    op.complete(Ok(()));
                }
                debug!(batch_size = size, pending = state.pending.len(), "batch succeeded");
                BatchOutcome::Committed(size)
            }
            Err(failure) => {
                warn!(
                    batch_size = size,
                    culprit = ?failure.culprit,
                    error = %failure.error,
                    "batch rolled back"
                );
                self.retry.settle(&mut state, batch, &failure, Instant::now());
                BatchOutcome::RolledBack(size)
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct QueueState {
    pub pending: PendingQueue,
    pub in_flight: usize,
    next_seq: u64,
    /// Batch formations attempted with work pending.
    pub cycle: u64,
    pub succeeded_total: u64,
    pub failed_total: u64,
    pub retried_total: u64,
    pub batches_executed: u64,
}

impl QueueState {
    pub fn outstanding(&self) -> usize {
        self.pending.len() + self.in_flight
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Put an operation back in line behind everything already queued.
    pub fn requeue(&mut self, mut op: Operation, not_before: Option<Instant>) {
        op.enqueued_at = self.next_seq();
        op.enqueued_cycle = self.cycle;
        op.not_before = not_before;
        self.pending.push(op);
    }
}

/// Result of one pass of the batch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchOutcome {
    /// Nothing ready to run.
    Idle,
    Committed(usize),
    RolledBack(usize),
}

impl WriteQueue {
    pub fn new(config: WriteQueueConfig, store: Arc<dyn GameStore>) -> Result<Self, ConfigError> {
        config.validate()?;
        let retry = RetryCoordinator::new(RetryPolicy::from_config(&config));
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                executor: TransactionExecutor::new(store),
                retry,
                state: Mutex::new(QueueState::default()),
                gate: Arc::new(tokio::sync::Mutex::new(())),
                scheduler: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &WriteQueueConfig {
        &self.inner.config
    }

    /// The store writes end up in. Reads may go straight to it.
    pub fn store(&self) -> &Arc<dyn GameStore> {
        self.inner.executor.store()
    }

    /// Validate and queue a write. Returns as soon as it is queued.
    pub fn enqueue(&self, request: OperationRequest) -> WriteQueueResult<OperationId> {
        self.admit(request, None)
    }

    /// Like [`enqueue`](Self::enqueue), plus a handle that resolves with the outcome.
    pub fn enqueue_tracked(
        &self,
        request: OperationRequest,
    ) -> WriteQueueResult<(OperationId, Completion)> {
        let (sender, completion) = completion::channel();
        let id = self.admit(request, Some(sender))?;
        Ok((id, completion))
    }

    fn admit(
        &self,
        request: OperationRequest,
        completion: Option<CompletionSender>,
    ) -> WriteQueueResult<OperationId> {
        let priority = request.priority.unwrap_or(priority::NORMAL);
        let max_retries = request.max_retries.unwrap_or(self.inner.config.max_retries);
        let mutation = request.into_mutation()?;

        let mut state = self.inner.lock_state();
        let capacity = self.inner.config.max_queue_size;
        if state.outstanding() >= capacity {
            warn!(capacity, table = %mutation.target(), "write queue full; rejecting operation");
            return Err(WriteQueueError::QueueFull { capacity });
        }

        let id = OperationId::new();
        let enqueued_at = state.next_seq();
        debug!(
            op_id = %id,
            kind = %mutation.kind(),
            table = %mutation.target(),
            priority,
            "write operation queued"
        );
        let op = Operation {
            id,
            mutation,
            priority,
            retry_count: 0,
            max_retries,
            enqueued_at,
            enqueued_cycle: state.cycle,
            not_before: None,
            status: OperationStatus::Pending,
            completion,
        };
        state.pending.push(op);
        Ok(id)
    }

    /// Run one write in its own transaction and wait for it.
    ///
    /// Skips the queue and retries but still waits its turn for the store.
    pub async fn execute_now(&self, request: OperationRequest) -> WriteQueueResult<()> {
        let mutation = request.into_mutation()?;
        let _gate = self.inner.acquire_gate().await;

        let result = self.inner.executor.execute(&[&mutation]).await;
        self.inner.lock_state().batches_executed += 1;

        result.map_err(|failure| {
            warn!(
                kind = %mutation.kind(),
                table = %mutation.target(),
                error = %failure.error,
                "direct write failed"
            );
            failure.error.into()
        })
    }

    pub fn status(&self) -> QueueStatus {
        let is_running = self.is_running();
        let state = self.inner.lock_state();
        QueueStatus {
            pending_count: state.pending.len(),
            in_flight_count: state.in_flight,
            succeeded_total: state.succeeded_total,
            failed_total: state.failed_total,
            retried_total: state.retried_total,
            batches_executed: state.batches_executed,
            is_running,
        }
    }

    /// Select one batch and execute it under `gate`.
    ///
    /// Execution happens on a spawned task that owns the batch and the gate.
    /// Dropping this future detaches the task: the batch still commits or
    /// settles, and no other transaction starts until it has.
    pub(crate) async fn run_batch(&self, gate: GateGuard) -> BatchOutcome {
        let batch = {
            let mut state = self.inner.lock_state();
            if state.pending.is_empty() {
                return BatchOutcome::Idle;
            }
            state.cycle += 1;
            let cycle = state.cycle;
            let batch = state.pending.select_batch(
                self.inner.config.batch_size,
                Instant::now(),
                cycle,
                self.inner.config.starvation_cycle_threshold,
            );
            state.in_flight += batch.len();
            batch
        };
        if batch.is_empty() {
            return BatchOutcome::Idle;
        }

        let size = batch.len();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _gate = gate;
            inner.execute_batch(batch).await
        });
        match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(batch_size = size, error = %err, "batch task ended abnormally");
                BatchOutcome::Idle
            }
        }
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}
