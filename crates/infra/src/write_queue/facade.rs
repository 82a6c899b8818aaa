//! Game-level write helpers.
//!
//! Thin builders over [`WriteQueue::enqueue`]: each picks the target, the
//! change-set and the priority (money first, stats next, audit log last).

use chrono::{DateTime, Utc};

use syndicate_core::{ActionLogEntry, Amount, PlayerChanges, PlayerId, StatChanges};

use super::error::{WriteQueueError, WriteQueueResult};
use super::operation::{OperationId, OperationRequest, priority};
use super::queue::WriteQueue;

#[derive(Clone, Debug)]
pub struct WriteFacade {
    queue: WriteQueue,
}

impl WriteFacade {
    pub fn new(queue: WriteQueue) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    /// Register a new player with an empty wallet.
    pub fn create_player(
        &self,
        player: PlayerId,
        username: impl Into<String>,
    ) -> WriteQueueResult<OperationId> {
        self.queue.enqueue(
            OperationRequest::create_player(player, PlayerChanges::new().username(username))
                .with_priority(priority::HIGH),
        )
    }

    /// Adjust cash and/or bank by relative amounts. Zero deltas are left out.
    pub fn update_balance(
        &self,
        player: PlayerId,
        cash_delta: i64,
        bank_delta: i64,
    ) -> WriteQueueResult<OperationId> {
        let mut changes = PlayerChanges::new();
        if cash_delta != 0 {
            changes = changes.cash(Amount::increment(cash_delta));
        }
        if bank_delta != 0 {
            changes = changes.bank(Amount::increment(bank_delta));
        }
        self.queue.enqueue(
            OperationRequest::update_player(player, changes).with_priority(priority::HIGH),
        )
    }

    /// Move `amount` from cash to bank in one write.
    pub fn deposit(&self, player: PlayerId, amount: i64) -> WriteQueueResult<OperationId> {
        if amount <= 0 {
            return Err(WriteQueueError::validation("deposit amount must be positive"));
        }
        self.update_balance(player, -amount, amount)
    }

    /// Move `amount` from bank to cash in one write.
    pub fn withdraw(&self, player: PlayerId, amount: i64) -> WriteQueueResult<OperationId> {
        if amount <= 0 {
            return Err(WriteQueueError::validation("withdrawal amount must be positive"));
        }
        self.update_balance(player, amount, -amount)
    }

    /// Apply stat changes, creating the stats row on first use.
    pub fn update_stats(
        &self,
        player: PlayerId,
        changes: StatChanges,
    ) -> WriteQueueResult<OperationId> {
        self.queue.enqueue(
            OperationRequest::upsert_stats(player, changes).with_priority(priority::NORMAL),
        )
    }

    /// Lock the player up until `until` and add `heat`.
    pub fn jail(
        &self,
        player: PlayerId,
        until: DateTime<Utc>,
        heat: i64,
    ) -> WriteQueueResult<OperationId> {
        let mut changes = StatChanges::new().jailed_until(until);
        if heat != 0 {
            changes = changes.heat(Amount::increment(heat));
        }
        self.update_stats(player, changes)
    }

    pub fn release(&self, player: PlayerId) -> WriteQueueResult<OperationId> {
        self.update_stats(player, StatChanges::new().release())
    }

    pub fn log_action(&self, entry: ActionLogEntry) -> WriteQueueResult<OperationId> {
        self.queue
            .enqueue(OperationRequest::append_action(entry).with_priority(priority::LOW))
    }

    /// Take `amount` cash right now, e.g. a bet before the outcome is shown.
    ///
    /// Fails with [`WriteQueueError::PermanentStore`] if the player cannot cover it.
    pub async fn debit_cash_now(&self, player: PlayerId, amount: i64) -> WriteQueueResult<()> {
        if amount <= 0 {
            return Err(WriteQueueError::validation("debit amount must be positive"));
        }
        self.queue
            .execute_now(OperationRequest::update_player(
                player,
                PlayerChanges::new().cash(Amount::decrement(amount)),
            ))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::WriteQueueConfig;
    use crate::store::scripted::ScriptedStore;
    use crate::store::{GameStore, InMemoryGameStore};

    fn facade() -> WriteFacade {
        let store = Arc::new(InMemoryGameStore::new());
        let queue = WriteQueue::new(WriteQueueConfig::default(), store).unwrap();
        WriteFacade::new(queue)
    }

    #[tokio::test]
    async fn money_goes_before_stats_before_logs() {
        let store = ScriptedStore::new();
        let queue = WriteQueue::new(WriteQueueConfig::default(), Arc::new(store.clone())).unwrap();
        let facade = WriteFacade::new(queue);
        let player = PlayerId::new();

        facade
            .log_action(ActionLogEntry::new(player, "crime.mug", "first in"))
            .unwrap();
        facade
            .update_stats(player, StatChanges::new().respect(Amount::increment(1)))
            .unwrap();
        facade.create_player(player, "michael").unwrap();
        facade.deposit(player, 0).unwrap_err();

        assert_eq!(facade.queue().flush().await, 1);
        let ops: Vec<_> = store.committed()[0].writes.iter().map(|t| t.op).collect();
        assert_eq!(ops, ["create_player", "upsert_stats", "append_action", "commit"]);
        assert!(store.player(player).await.unwrap().is_some());
        assert_eq!(store.stats(player).await.unwrap().unwrap().respect, 1);
        assert_eq!(store.actions(player, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deposit_moves_cash_to_bank() {
        let facade = facade();
        let player = PlayerId::new();
        facade.create_player(player, "kay").unwrap();
        facade.update_balance(player, 300, 0).unwrap();
        facade.deposit(player, 120).unwrap();
        facade.queue().flush().await;

        let wallet = facade.queue().store().player(player).await.unwrap().unwrap();
        assert_eq!((wallet.cash, wallet.bank), (180, 120));
    }

    #[tokio::test]
    async fn zero_balance_change_is_rejected() {
        let facade = facade();
        let err = facade.update_balance(PlayerId::new(), 0, 0).unwrap_err();
        assert!(matches!(err, WriteQueueError::Validation(_)));
    }

    #[tokio::test]
    async fn jail_sets_release_time_and_heat() {
        let facade = facade();
        let player = PlayerId::new();
        let until = Utc::now() + chrono::Duration::minutes(10);
        facade.jail(player, until, 4).unwrap();
        facade.queue().flush().await;

        let stats = facade.queue().store().stats(player).await.unwrap().unwrap();
        assert_eq!(stats.jailed_until, Some(until));
        assert_eq!(stats.heat, 4);
        assert!(stats.is_jailed(Utc::now()));

        facade.release(player).unwrap();
        facade.queue().flush().await;
        let stats = facade.queue().store().stats(player).await.unwrap().unwrap();
        assert!(!stats.is_jailed(Utc::now()));
    }

    #[tokio::test]
    async fn debit_cash_now_confirms_synchronously() {
        let facade = facade();
        let player = PlayerId::new();
        facade.create_player(player, "tom").unwrap();
        facade.update_balance(player, 50, 0).unwrap();
        facade.queue().flush().await;

        facade.debit_cash_now(player, 20).await.unwrap();
        let err = facade.debit_cash_now(player, 31).await.unwrap_err();
        assert!(matches!(err, WriteQueueError::PermanentStore(_)));

        let wallet = facade.queue().store().player(player).await.unwrap().unwrap();
        assert_eq!(wallet.cash, 30);
    }
}
