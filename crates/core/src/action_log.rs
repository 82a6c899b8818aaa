//! Append-only audit trail of player actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{ActionLogId, PlayerId};

/// Longest action tag accepted (`"crime.rob_store"`, `"casino.blackjack"`, ...).
pub const MAX_ACTION_LEN: usize = 64;

/// One audit log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: ActionLogId,
    pub player_id: PlayerId,
    /// Dotted action tag, e.g. `casino.slots`.
    pub action: String,
    /// Free-form human readable detail.
    pub detail: String,
    /// Money moved by the action, when there was any.
    pub amount: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

impl Entity for ActionLogEntry {
    type Id = ActionLogId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl ActionLogEntry {
    pub fn new(player_id: PlayerId, action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: ActionLogId::new(),
            player_id,
            action: action.into(),
            detail: detail.into(),
            amount: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        let action = self.action.trim();
        if action.is_empty() {
            return Err(DomainError::validation("action tag must not be blank"));
        }
        if action.len() > MAX_ACTION_LEN {
            return Err(DomainError::validation(format!(
                "action tag longer than {MAX_ACTION_LEN} bytes"
            )));
        }
        Ok(())
    }
}
