//! Applies one batch of mutations inside a single store transaction.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::{GameStore, StoreError, StoreResult, StoreTransaction};

use super::operation::{Mutation, Write};

/// Why a batch did not commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Index of the mutation whose handler failed. `None` when opening or
    /// committing the transaction failed, which implicates every mutation.
    pub culprit: Option<usize>,
    pub error: StoreError,
}

/// Runs batches atomically: every mutation commits, or none does.
#[derive(Clone)]
pub struct TransactionExecutor {
    store: Arc<dyn GameStore>,
}

impl TransactionExecutor {
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// Apply `mutations` in order and commit.
    ///
    /// Callers must not run two batches at once; the store is a single writer.
    pub async fn execute(&self, mutations: &[&Mutation]) -> Result<(), BatchFailure> {
        let mut tx = self.store.begin().await.map_err(|error| BatchFailure {
            culprit: None,
            error,
        })?;

        for (index, mutation) in mutations.iter().enumerate() {
            if let Err(error) = apply(tx.as_mut(), mutation).await {
                debug!(
                    index,
                    kind = %mutation.kind(),
                    table = %mutation.target(),
                    error = %error,
                    "mutation failed; rolling back batch"
                );
                rollback(tx.as_mut()).await;
                return Err(BatchFailure {
                    culprit: Some(index),
                    error,
                });
            }
        }

        if let Err(error) = tx.commit().await {
            rollback(tx.as_mut()).await;
            return Err(BatchFailure {
                culprit: None,
                error,
            });
        }

        debug!(operations = mutations.len(), "batch committed");
        Ok(())
    }
}

async fn rollback(tx: &mut dyn StoreTransaction) {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "rollback failed");
    }
}

/// Dispatch one mutation to the handler for its target and kind.
pub(crate) async fn apply(tx: &mut dyn StoreTransaction, mutation: &Mutation) -> StoreResult<()> {
    match mutation {
        Mutation::Player(write) => match write {
            Write::Create { key, changes } => tx.create_player(*key, changes).await,
            Write::Update { key, changes } => tx.update_player(*key, changes).await,
            Write::Upsert { key, changes } => tx.upsert_player(*key, changes).await,
            Write::Delete { key } => tx.delete_player(*key).await,
        },
        Mutation::Stats(write) => match write {
            Write::Create { key, changes } => tx.create_stats(*key, changes).await,
            Write::Update { key, changes } => tx.update_stats(*key, changes).await,
            Write::Upsert { key, changes } => tx.upsert_stats(*key, changes).await,
            Write::Delete { key } => tx.delete_stats(*key).await,
        },
        Mutation::AppendAction(entry) => tx.append_action(entry).await,
    }
}
