//! Read-only queue snapshots.

use serde::Serialize;

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Waiting operations, including those in backoff.
    pub pending_count: usize,
    /// Operations in the batch currently executing.
    pub in_flight_count: usize,
    pub succeeded_total: u64,
    pub failed_total: u64,
    /// Retries scheduled after transient failures.
    pub retried_total: u64,
    /// Transactions attempted, committed or not.
    pub batches_executed: u64,
    pub is_running: bool,
}

impl QueueStatus {
    pub fn outstanding(&self) -> usize {
        self.pending_count + self.in_flight_count
    }
}

/// Outcome of [`WriteQueue::drain`](super::WriteQueue::drain).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub flushed_batches: usize,
    /// Operations still queued when the grace period ran out.
    pub remaining: usize,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_for_the_status_command() {
        let status = QueueStatus {
            pending_count: 3,
            in_flight_count: 2,
            succeeded_total: 10,
            is_running: true,
            ..QueueStatus::default()
        };
        assert_eq!(status.outstanding(), 5);

        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["pending_count"], 3);
        assert_eq!(json["is_running"], true);
        assert_eq!(json["failed_total"], 0);
    }
}
