//! Ordered buffer of pending operations.
//!
//! Ordered by priority (descending) then enqueue sequence (ascending). A
//! secondary index by sequence lets batch selection find operations that have
//! waited too many scheduler cycles and promote them ahead of everything else.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use tokio::time::Instant;

use super::operation::{Operation, OperationStatus};

type OrderKey = (Reverse<i32>, u64);

#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    ordered: BTreeMap<OrderKey, Operation>,
    /// Sequence number to priority, oldest first.
    by_age: BTreeMap<u64, i32>,
}

impl PendingQueue {
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Insert an operation. Its `enqueued_at` must be unique.
    pub fn push(&mut self, mut op: Operation) {
        op.status = OperationStatus::Pending;
        self.by_age.insert(op.enqueued_at, op.priority);
        self.ordered.insert((Reverse(op.priority), op.enqueued_at), op);
    }

    /// Take up to `limit` operations that are ready at `now`.
    ///
    /// Operations whose age exceeds `starvation_threshold` cycles come first,
    /// oldest first; the rest are filled in priority order.
    pub fn select_batch(
        &mut self,
        limit: usize,
        now: Instant,
        cycle: u64,
        starvation_threshold: u64,
    ) -> Vec<Operation> {
        let mut picked: Vec<OrderKey> = Vec::new();

        for (&seq, &priority) in &self.by_age {
            if picked.len() == limit {
                break;
            }
            let key = (Reverse(priority), seq);
            let Some(op) = self.ordered.get(&key) else {
                continue;
            };
            // Sequence order is also insertion-cycle order.
            if cycle.saturating_sub(op.enqueued_cycle) <= starvation_threshold {
                break;
            }
            if op.is_ready(now) {
                picked.push(key);
            }
        }
        let promoted = picked.len();

        for (key, op) in &self.ordered {
            if picked.len() == limit {
                break;
            }
            if op.is_ready(now) && !picked[..promoted].contains(key) {
                picked.push(*key);
            }
        }

        picked
            .into_iter()
            .filter_map(|key| {
                self.by_age.remove(&key.1);
                self.ordered.remove(&key)
            })
            .map(|mut op| {
                op.status = OperationStatus::InBatch;
                op
            })
            .collect()
    }

    /// Earliest backoff expiry among the pending operations.
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.ordered.values().filter_map(|op| op.not_before).min()
    }

    /// Whether anything can be selected at `now`.
    pub fn has_ready(&self, now: Instant) -> bool {
        self.ordered.values().any(|op| op.is_ready(now))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::write_queue::operation::{Mutation, OperationId};
    use proptest::prelude::*;
    use std::time::Duration;
    use syndicate_core::{ActionLogEntry, PlayerId};

    pub(crate) fn op(priority: i32, seq: u64, cycle: u64) -> Operation {
        Operation {
            id: OperationId::new(),
            mutation: Mutation::AppendAction(ActionLogEntry::new(
                PlayerId::new(),
                "test.op",
                format!("seq {seq}"),
            )),
            priority,
            retry_count: 0,
            max_retries: 3,
            enqueued_at: seq,
            enqueued_cycle: cycle,
            not_before: None,
            status: OperationStatus::Pending,
            completion: None,
        }
    }

    fn seqs(batch: &[Operation]) -> Vec<u64> {
        batch.iter().map(|op| op.enqueued_at).collect()
    }

    #[test]
    fn higher_priority_first_then_fifo() {
        let mut queue = PendingQueue::default();
        queue.push(op(1, 0, 0));
        queue.push(op(5, 1, 0));
        queue.push(op(10, 2, 0));
        queue.push(op(5, 3, 0));

        let batch = queue.select_batch(10, Instant::now(), 1, 50);
        assert_eq!(seqs(&batch), vec![2, 1, 3, 0]);
        assert!(batch.iter().all(|op| op.status == OperationStatus::InBatch));
        assert!(queue.is_empty());
    }

    #[test]
    fn batch_is_bounded() {
        let mut queue = PendingQueue::default();
        for seq in 0..5 {
            queue.push(op(5, seq, 0));
        }
        let batch = queue.select_batch(2, Instant::now(), 1, 50);
        assert_eq!(seqs(&batch), vec![0, 1]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn operations_in_backoff_are_skipped() {
        let now = Instant::now();
        let mut queue = PendingQueue::default();
        let mut waiting = op(10, 0, 0);
        waiting.not_before = Some(now + Duration::from_millis(100));
        queue.push(waiting);
        queue.push(op(1, 1, 0));

        let batch = queue.select_batch(10, now, 1, 50);
        assert_eq!(seqs(&batch), vec![1]);
        assert!(!queue.has_ready(now));
        assert_eq!(queue.next_ready_at(), Some(now + Duration::from_millis(100)));

        let later = now + Duration::from_millis(100);
        assert_eq!(seqs(&queue.select_batch(10, later, 2, 50)), vec![0]);
    }

    #[test]
    fn starved_operations_jump_the_line_oldest_first() {
        let mut queue = PendingQueue::default();
        queue.push(op(1, 0, 0));
        queue.push(op(2, 1, 1));
        queue.push(op(10, 2, 5));
        queue.push(op(10, 3, 5));

        // Cycle 4 with threshold 2: seq 0 (age 4) and seq 1 (age 3) are starved.
        let batch = queue.select_batch(3, Instant::now(), 4, 2);
        assert_eq!(seqs(&batch), vec![0, 1, 2]);
    }

    #[test]
    fn nothing_is_starved_at_the_threshold() {
        let mut queue = PendingQueue::default();
        queue.push(op(1, 0, 0));
        queue.push(op(10, 1, 0));

        let batch = queue.select_batch(1, Instant::now(), 2, 2);
        assert_eq!(seqs(&batch), vec![1]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn selection_is_priority_desc_then_fifo(
            priorities in prop::collection::vec(-5i32..20, 1..40),
        ) {
            let mut queue = PendingQueue::default();
            for (seq, priority) in priorities.iter().enumerate() {
                queue.push(op(*priority, seq as u64, 0));
            }

            let batch = queue.select_batch(priorities.len(), Instant::now(), 1, u64::MAX);
            prop_assert_eq!(batch.len(), priorities.len());
            for pair in batch.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(
                    a.priority > b.priority
                        || (a.priority == b.priority && a.enqueued_at < b.enqueued_at)
                );
            }
        }
    }
}
