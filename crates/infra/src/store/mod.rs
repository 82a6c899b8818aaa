//! Transactional game store boundary.
//!
//! The write queue is the only writer. It talks to storage through
//! [`GameStore::begin`], which hands out a [`StoreTransaction`] exposing the
//! per-target create/update/upsert/delete handlers. Everything applied through
//! one transaction becomes visible on `commit` or not at all.
//!
//! Errors are split by whether retrying can help: lock contention and I/O
//! hiccups are [`StoreError::Transient`]; constraint and invariant violations,
//! missing rows and malformed data are [`StoreError::Permanent`].

pub mod in_memory;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use syndicate_core::{
    ActionLogEntry, DomainError, PlayerChanges, PlayerId, PlayerRecord, StatChanges, StatsRecord,
};

pub use in_memory::InMemoryGameStore;
pub use sqlite::SqliteGameStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Whether a failed write may succeed if tried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Transient,
    Permanent,
}

/// Store operation error, pre-classified for the retry logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Resource busy, lock contention, pool exhaustion, I/O.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Constraint violation, missing row, invariant breach.
    #[error("permanent store failure: {0}")]
    Permanent(String),
}

impl StoreError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn class(&self) -> FailureClass {
        match self {
            StoreError::Transient(_) => FailureClass::Transient,
            StoreError::Permanent(_) => FailureClass::Permanent,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StoreError::Transient(msg) | StoreError::Permanent(msg) => msg,
        }
    }

    pub(crate) fn not_found(table: &str, key: impl std::fmt::Display) -> Self {
        Self::Permanent(format!("{table} row {key} not found"))
    }

    pub(crate) fn duplicate(table: &str, key: impl std::fmt::Display) -> Self {
        Self::Permanent(format!("{table} row {key} already exists"))
    }
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        // Re-running the same change against the same row fails the same way.
        StoreError::Permanent(value.to_string())
    }
}

/// One open writer transaction.
///
/// Handlers are dispatched per target. A handler error leaves the
/// transaction unusable; the caller must `rollback`.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn create_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()>;
    async fn update_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()>;
    async fn upsert_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()>;
    async fn delete_player(&mut self, id: PlayerId) -> StoreResult<()>;

    async fn create_stats(&mut self, player_id: PlayerId, changes: &StatChanges) -> StoreResult<()>;
    async fn update_stats(&mut self, player_id: PlayerId, changes: &StatChanges) -> StoreResult<()>;
    async fn upsert_stats(&mut self, player_id: PlayerId, changes: &StatChanges) -> StoreResult<()>;
    async fn delete_stats(&mut self, player_id: PlayerId) -> StoreResult<()>;

    /// The action log is append-only: create is the only handler.
    async fn append_action(&mut self, entry: &ActionLogEntry) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;
    async fn rollback(&mut self) -> StoreResult<()>;
}

/// Single-writer game store.
///
/// Reads are exposed for command handlers and tests; they never go through
/// the write queue.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Open a writer transaction.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    async fn player(&self, id: PlayerId) -> StoreResult<Option<PlayerRecord>>;
    async fn stats(&self, player_id: PlayerId) -> StoreResult<Option<StatsRecord>>;

    /// Most recent entries first.
    async fn actions(&self, player_id: PlayerId, limit: usize) -> StoreResult<Vec<ActionLogEntry>>;
}
