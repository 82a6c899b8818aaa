//! Timer-driven batch loop plus the flush and drain protocols.
//!
//! Every path that touches the store (timer ticks, `flush`, `drain`,
//! `execute_now`) holds the queue's execution gate for the whole transaction,
//! so at most one transaction is ever open.

use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::millis;

use super::queue::{BatchOutcome, Inner, WriteQueue};
use super::status::DrainReport;

pub(crate) struct SchedulerHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl WriteQueue {
    /// Start the periodic batch loop on the current tokio runtime.
    ///
    /// Calling it while the loop is already running does nothing.
    pub fn start(&self) {
        let mut slot = self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.join.is_finished()) {
            debug!("write queue scheduler already running");
            return;
        }

        let config = &self.inner.config;
        let shutdown = Arc::new(Notify::new());
        let join = tokio::spawn(run_scheduler(
            Arc::downgrade(&self.inner),
            config.processing_interval,
            shutdown.clone(),
        ));
        *slot = Some(SchedulerHandle { shutdown, join });

        info!(
            interval_ms = millis(config.processing_interval),
            batch_size = config.batch_size,
            "write queue scheduler started"
        );
    }

    /// Stop the timer. A batch already executing finishes first; pending
    /// operations stay queued.
    pub async fn stop(&self) {
        let handle = self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        handle.shutdown.notify_one();
        if let Err(err) = handle.join.await {
            warn!(error = %err, "write queue scheduler task ended abnormally");
        }
        info!("write queue scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.join.is_finished())
    }

    /// Execute batches back to back until nothing is ready.
    ///
    /// Returns once the queue is empty or every pending operation is waiting
    /// out a backoff. Returns the number of batches executed.
    pub async fn flush(&self) -> usize {
        self.flush_until(None).await
    }

    /// Like `flush`, but stops starting new batches once `deadline` passes.
    async fn flush_until(&self, deadline: Option<Instant>) -> usize {
        let mut batches = 0;
        loop {
            let gate = self.inner.acquire_gate().await;
            if self.run_batch(gate).await == BatchOutcome::Idle {
                break;
            }
            batches += 1;
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
        }
        batches
    }

    /// Shutdown protocol: stop the timer, then flush, sleeping through
    /// backoffs, until the queue is empty or `grace` has passed.
    pub async fn drain(&self, grace: Duration) -> DrainReport {
        self.stop().await;
        let deadline = Instant::now().checked_add(grace);
        let mut flushed_batches = 0;

        loop {
            flushed_batches += self.flush_until(deadline).await;

            let wake = {
                let state = self.inner.lock_state();
                if state.pending.is_empty() {
                    break;
                }
                let now = Instant::now();
                if state.pending.has_ready(now) {
                    now
                } else {
                    state.pending.next_ready_at().unwrap_or(now)
                }
            };
            if deadline.is_some_and(|deadline| wake > deadline) {
                break;
            }
            tokio::time::sleep_until(wake).await;
        }

        let remaining = self.inner.lock_state().outstanding();
        if remaining == 0 {
            info!(flushed_batches, "write queue drained");
        } else {
            warn!(
                flushed_batches,
                remaining,
                "drain grace period expired with writes outstanding"
            );
        }
        DrainReport {
            flushed_batches,
            remaining,
        }
    }

    /// One timer tick: run a batch unless another path holds the gate.
    async fn tick(&self) {
        let Some(gate) = self.inner.try_acquire_gate() else {
            return;
        };
        self.run_batch(gate).await;
    }
}

async fn run_scheduler(queue: Weak<Inner>, period: Duration, shutdown: Arc<Notify>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {
                // The queue owns this task; once every handle is gone, exit.
                let Some(inner) = queue.upgrade() else {
                    break;
                };
                WriteQueue { inner }.tick().await;
            }
        }
    }
}
