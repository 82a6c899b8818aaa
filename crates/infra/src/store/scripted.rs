//! Fault-injecting store wrapper for tests.
//!
//! Wraps an [`InMemoryGameStore`], records every transaction it hands out and
//! fails writes matching scripted rules.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use syndicate_core::{
    ActionLogEntry, PlayerChanges, PlayerId, PlayerRecord, StatChanges, StatsRecord,
};

use super::{GameStore, InMemoryGameStore, StoreError, StoreResult, StoreTransaction};

/// One call made on a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Touch {
    pub op: &'static str,
    pub player: Option<PlayerId>,
    pub action: Option<String>,
}

impl Touch {
    fn keyed(op: &'static str, player: PlayerId) -> Self {
        Self {
            op,
            player: Some(player),
            action: None,
        }
    }

    fn commit() -> Self {
        Self {
            op: "commit",
            player: None,
            action: None,
        }
    }

    pub fn is_commit(&self) -> bool {
        self.op == "commit"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxOutcome {
    Open,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone)]
pub(crate) struct TxRecord {
    pub writes: Vec<Touch>,
    pub outcome: TxOutcome,
}

type Matcher = Arc<dyn Fn(&Touch) -> bool + Send + Sync>;

struct Fault {
    matcher: Matcher,
    error: StoreError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Default)]
struct Script {
    faults: Vec<Fault>,
    history: Vec<TxRecord>,
    active: usize,
    max_active: usize,
    latency: Option<Duration>,
}

impl Script {
    fn check(&mut self, touch: &Touch) -> StoreResult<()> {
        for fault in &mut self.faults {
            if fault.remaining == Some(0) || !(fault.matcher)(touch) {
                continue;
            }
            if let Some(remaining) = fault.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err(fault.error.clone());
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedStore {
    inner: InMemoryGameStore,
    script: Arc<Mutex<Script>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `times` calls matching `matcher`.
    pub fn fail_times(
        &self,
        times: usize,
        matcher: impl Fn(&Touch) -> bool + Send + Sync + 'static,
        error: StoreError,
    ) {
        self.script().faults.push(Fault {
            matcher: Arc::new(matcher),
            error,
            remaining: Some(times),
        });
    }

    /// Fail every call matching `matcher`.
    pub fn fail_always(
        &self,
        matcher: impl Fn(&Touch) -> bool + Send + Sync + 'static,
        error: StoreError,
    ) {
        self.script().faults.push(Fault {
            matcher: Arc::new(matcher),
            error,
            remaining: None,
        });
    }

    /// Sleep this long inside every write.
    pub fn set_latency(&self, latency: Duration) {
        self.script().latency = Some(latency);
    }

    pub fn transactions(&self) -> Vec<TxRecord> {
        self.script().history.clone()
    }

    pub fn committed(&self) -> Vec<TxRecord> {
        self.transactions()
            .into_iter()
            .filter(|tx| tx.outcome == TxOutcome::Committed)
            .collect()
    }

    /// Highest number of transactions that were open at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.script().max_active
    }

    pub fn inner(&self) -> &InMemoryGameStore {
        &self.inner
    }
}

/// Matches writes that touch `player`.
pub(crate) fn touching(player: PlayerId) -> impl Fn(&Touch) -> bool + Send + Sync + 'static {
    move |touch| touch.player == Some(player)
}

/// Matches the commit call.
pub(crate) fn on_commit() -> impl Fn(&Touch) -> bool + Send + Sync + 'static {
    |touch| touch.is_commit()
}

#[async_trait]
impl GameStore for ScriptedStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let inner = self.inner.begin().await?;
        let index = {
            let mut script = self.script();
            script.active += 1;
            script.max_active = script.max_active.max(script.active);
            script.history.push(TxRecord {
                writes: Vec::new(),
                outcome: TxOutcome::Open,
            });
            script.history.len() - 1
        };
        Ok(Box::new(ScriptedTransaction {
            inner,
            script: self.script.clone(),
            index,
            finished: false,
        }))
    }

    async fn player(&self, id: PlayerId) -> StoreResult<Option<PlayerRecord>> {
        self.inner.player(id).await
    }

    async fn stats(&self, player_id: PlayerId) -> StoreResult<Option<StatsRecord>> {
        self.inner.stats(player_id).await
    }

    async fn actions(&self, player_id: PlayerId, limit: usize) -> StoreResult<Vec<ActionLogEntry>> {
        self.inner.actions(player_id, limit).await
    }
}

struct ScriptedTransaction {
    inner: Box<dyn StoreTransaction>,
    script: Arc<Mutex<Script>>,
    index: usize,
    finished: bool,
}

impl ScriptedTransaction {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, then apply latency and scripted faults.
    async fn observe(&mut self, touch: Touch) -> StoreResult<()> {
        let (latency, verdict) = {
            let mut script = self.script();
            script.history[self.index].writes.push(touch.clone());
            let verdict = script.check(&touch);
            (script.latency, verdict)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        verdict
    }

    fn finish(&mut self, outcome: TxOutcome) {
        if self.finished {
            return;
        }
        self.finished = true;
        let mut script = self.script();
        script.active = script.active.saturating_sub(1);
        script.history[self.index].outcome = outcome;
    }
}

#[async_trait]
impl StoreTransaction for ScriptedTransaction {
    async fn create_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()> {
        self.observe(Touch::keyed("create_player", id)).await?;
        self.inner.create_player(id, changes).await
    }

    async fn update_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()> {
        self.observe(Touch::keyed("update_player", id)).await?;
        self.inner.update_player(id, changes).await
    }

    async fn upsert_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()> {
        self.observe(Touch::keyed("upsert_player", id)).await?;
        self.inner.upsert_player(id, changes).await
    }

    async fn delete_player(&mut self, id: PlayerId) -> StoreResult<()> {
        self.observe(Touch::keyed("delete_player", id)).await?;
        self.inner.delete_player(id).await
    }

    async fn create_stats(
        &mut self,
        player_id: PlayerId,
        changes: &StatChanges,
    ) -> StoreResult<()> {
        self.observe(Touch::keyed("create_stats", player_id)).await?;
        self.inner.create_stats(player_id, changes).await
    }

    async fn update_stats(
        &mut self,
        player_id: PlayerId,
        changes: &StatChanges,
    ) -> StoreResult<()> {
        self.observe(Touch::keyed("update_stats", player_id)).await?;
        self.inner.update_stats(player_id, changes).await
    }

    async fn upsert_stats(
        &mut self,
        player_id: PlayerId,
        changes: &StatChanges,
    ) -> StoreResult<()> {
        self.observe(Touch::keyed("upsert_stats", player_id)).await?;
        self.inner.upsert_stats(player_id, changes).await
    }

    async fn delete_stats(&mut self, player_id: PlayerId) -> StoreResult<()> {
        self.observe(Touch::keyed("delete_stats", player_id)).await?;
        self.inner.delete_stats(player_id).await
    }

    async fn append_action(&mut self, entry: &ActionLogEntry) -> StoreResult<()> {
        self.observe(Touch {
            op: "append_action",
            player: Some(entry.player_id),
            action: Some(entry.action.clone()),
        })
        .await?;
        self.inner.append_action(entry).await
    }

    async fn commit(&mut self) -> StoreResult<()> {
        if let Err(err) = self.observe(Touch::commit()).await {
            self.inner.rollback().await?;
            self.finish(TxOutcome::RolledBack);
            return Err(err);
        }
        let result = self.inner.commit().await;
        let outcome = if result.is_ok() {
            TxOutcome::Committed
        } else {
            TxOutcome::RolledBack
        };
        self.finish(outcome);
        result
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        let result = self.inner.rollback().await;
        self.finish(TxOutcome::RolledBack);
        result
    }
}
