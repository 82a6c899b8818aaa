//! Retry decisions for operations of a failed batch.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::{WriteQueueConfig, millis};
use crate::store::StoreError;

use super::error::WriteQueueError;
use super::executor::BatchFailure;
use super::operation::Operation;
use super::queue::QueueState;

/// Exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &WriteQueueConfig) -> Self {
        Self::new(config.base_backoff, config.max_backoff)
    }

    /// Delay before retry number `retry` (1-indexed): `base * 2^(retry-1)`, capped.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        2u32.checked_pow(retry - 1)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether an operation that has been retried `retry_count` times may go again.
    pub fn should_retry(&self, retry_count: u32, max_retries: u32) -> bool {
        retry_count < max_retries
    }
}

/// What happens to one operation after its batch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Rolled back only because a peer failed: back in line, no charge.
    Requeue,
    /// Charged one retry and held back for the delay.
    Backoff(Duration),
    Fail(WriteQueueError),
}

#[derive(Debug, Clone)]
pub(crate) struct RetryCoordinator {
    policy: RetryPolicy,
}

impl RetryCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// `error` is `None` for operations that did not cause the failure.
    pub fn decide(&self, op: &Operation, error: Option<&StoreError>) -> Disposition {
        match error {
            None => Disposition::Requeue,
            Some(StoreError::Permanent(msg)) => {
                Disposition::Fail(WriteQueueError::PermanentStore(msg.clone()))
            }
            Some(StoreError::Transient(_))
                if self.policy.should_retry(op.retry_count, op.max_retries) =>
            {
                Disposition::Backoff(self.policy.delay_for_retry(op.retry_count + 1))
            }
            Some(StoreError::Transient(msg)) => {
                Disposition::Fail(WriteQueueError::RetriesExhausted {
                    attempts: op.retry_count + 1,
                    last_error: msg.clone(),
                })
            }
        }
    }

    /// Requeue, delay or fail every operation of a batch that did not commit.
    pub fn settle(
        &self,
        state: &mut QueueState,
        batch: Vec<Operation>,
        failure: &BatchFailure,
        now: Instant,
    ) {
        for (index, mut op) in batch.into_iter().enumerate() {
            let implicated = failure.culprit.is_none_or(|culprit| culprit == index);
            let error = implicated.then_some(&failure.error);

            match self.decide(&op, error) {
                Disposition::Requeue => {
                    debug!(op_id = %op.id, "requeueing operation rolled back with its batch");
                    state.requeue(op, None);
                }
                Disposition::Backoff(delay) => {
                    op.retry_count += 1;
                    state.retried_total += 1;
                    warn!(
                        op_id = %op.id,
                        kind = %op.mutation.kind(),
                        table = %op.mutation.target(),
                        retry = op.retry_count,
                        max_retries = op.max_retries,
                        delay_ms = millis(delay),
                        error = %failure.error,
                        "transient write failure; retry scheduled"
                    );
                    state.requeue(op, Some(now + delay));
                }
                Disposition::Fail(err) => {
                    state.failed_total += 1;
                    error!(
                        op_id = %op.id,
                        kind = %op.mutation.kind(),
                        table = %op.mutation.target(),
                        player_id = %op.mutation.player_id(),
                        attempts = op.retry_count + 1,
                        error = %err,
                        "write operation failed"
                    );
                    op.complete(Err(err));
                }
            }
        }
    }
}
