//! In-memory game store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use syndicate_core::{
    ActionLogEntry, Entity, PlayerChanges, PlayerId, PlayerRecord, StatChanges, StatsRecord,
};

use super::{GameStore, StoreError, StoreResult, StoreTransaction};

#[derive(Debug, Clone, Default)]
struct Tables {
    players: HashMap<PlayerId, PlayerRecord>,
    stats: HashMap<PlayerId, StatsRecord>,
    actions: Vec<ActionLogEntry>,
}

/// In-memory store.
///
/// A transaction works on a private copy of the tables and swaps it in on
/// commit. Like SQLite it supports one writer at a time: two transactions
/// committed concurrently would overwrite each other (last commit wins).
#[derive(Debug, Clone, Default)]
pub struct InMemoryGameStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn player_count(&self) -> usize {
        self.lock().players.len()
    }

    pub fn action_count(&self) -> usize {
        self.lock().actions.len()
    }
}

#[async_trait]
impl GameStore for InMemoryGameStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let staged = self.lock().clone();
        Ok(Box::new(InMemoryTransaction {
            shared: self.tables.clone(),
            staged: Some(staged),
        }))
    }

    async fn player(&self, id: PlayerId) -> StoreResult<Option<PlayerRecord>> {
        Ok(self.lock().players.get(&id).cloned())
    }

    async fn stats(&self, player_id: PlayerId) -> StoreResult<Option<StatsRecord>> {
        Ok(self.lock().stats.get(&player_id).cloned())
    }

    async fn actions(&self, player_id: PlayerId, limit: usize) -> StoreResult<Vec<ActionLogEntry>> {
        let tables = self.lock();
        Ok(tables
            .actions
            .iter()
            .rev()
            .filter(|entry| entry.player_id == player_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

struct InMemoryTransaction {
    shared: Arc<Mutex<Tables>>,
    /// `None` once committed or rolled back.
    staged: Option<Tables>,
}

impl InMemoryTransaction {
    fn tables(&mut self) -> StoreResult<&mut Tables> {
        self.staged
            .as_mut()
            .ok_or_else(|| StoreError::permanent("transaction already finished"))
    }
}

/// Insert-only helper shared by the keyed tables.
fn insert_new<E: Entity + Clone>(
    table: &mut HashMap<E::Id, E>,
    name: &str,
    record: E,
) -> StoreResult<()>
where
    E::Id: std::fmt::Display,
{
    let key = record.id().clone();
    if table.contains_key(&key) {
        return Err(StoreError::duplicate(name, key));
    }
    table.insert(key, record);
    Ok(())
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn create_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()> {
        let record = PlayerRecord::create(id, changes)?;
        insert_new(&mut self.tables()?.players, "players", record)
    }

    async fn update_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()> {
        let record = self
            .tables()?
            .players
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("players", id))?;
        record.apply(changes)?;
        Ok(())
    }

    async fn upsert_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()> {
        let players = &mut self.tables()?.players;
        match players.get_mut(&id) {
            Some(record) => record.apply(changes)?,
            None => {
                players.insert(id, PlayerRecord::create(id, changes)?);
            }
        }
        Ok(())
    }

    async fn delete_player(&mut self, id: PlayerId) -> StoreResult<()> {
        self.tables()?
            .players
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("players", id))
    }

    async fn create_stats(
        &mut self,
        player_id: PlayerId,
        changes: &StatChanges,
    ) -> StoreResult<()> {
        let record = StatsRecord::create(player_id, changes)?;
        insert_new(&mut self.tables()?.stats, "player_stats", record)
    }

    async fn update_stats(
        &mut self,
        player_id: PlayerId,
        changes: &StatChanges,
    ) -> StoreResult<()> {
        let record = self
            .tables()?
            .stats
            .get_mut(&player_id)
            .ok_or_else(|| StoreError::not_found("player_stats", player_id))?;
        record.apply(changes)?;
        Ok(())
    }

    async fn upsert_stats(
        &mut self,
        player_id: PlayerId,
        changes: &StatChanges,
    ) -> StoreResult<()> {
        let stats = &mut self.tables()?.stats;
        match stats.get_mut(&player_id) {
            Some(record) => record.apply(changes)?,
            None => {
                stats.insert(player_id, StatsRecord::create(player_id, changes)?);
            }
        }
        Ok(())
    }

    async fn delete_stats(&mut self, player_id: PlayerId) -> StoreResult<()> {
        self.tables()?
            .stats
            .remove(&player_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("player_stats", player_id))
    }

    async fn append_action(&mut self, entry: &ActionLogEntry) -> StoreResult<()> {
        let actions = &mut self.tables()?.actions;
        if actions.iter().any(|existing| existing.id == entry.id) {
            return Err(StoreError::duplicate("action_log", entry.id));
        }
        actions.push(entry.clone());
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| StoreError::permanent("transaction already finished"))?;
        *self.shared.lock().unwrap_or_else(PoisonError::into_inner) = staged;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.staged = None;
        Ok(())
    }
}
