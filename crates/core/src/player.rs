//! Player wallet record.

use serde::{Deserialize, Serialize};

use crate::amount::{Amount, apply_non_negative};
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::PlayerId;
use crate::value_object::ValueObject;

/// Longest username the chat platform hands us.
pub const MAX_USERNAME_LEN: usize = 64;

/// Persisted player row: identity plus the two money columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub username: String,
    /// Money on hand (can be robbed, bet, fined).
    pub cash: i64,
    /// Money in the bank (safe from robbery).
    pub bank: i64,
}

impl Entity for PlayerRecord {
    type Id = PlayerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl PlayerRecord {
    /// Build a new row from a change-set. Missing columns start at zero.
    pub fn create(id: PlayerId, changes: &PlayerChanges) -> DomainResult<Self> {
        let mut record = Self {
            id,
            username: String::new(),
            cash: 0,
            bank: 0,
        };
        record.apply(changes)?;
        Ok(record)
    }

    /// Apply a change-set. On error the record is left untouched.
    pub fn apply(&mut self, changes: &PlayerChanges) -> DomainResult<()> {
        let cash = apply_non_negative("cash", self.cash, changes.cash)?;
        let bank = apply_non_negative("bank", self.bank, changes.bank)?;

        if let Some(username) = &changes.username {
            self.username = username.clone();
        }
        self.cash = cash;
        self.bank = bank;
        Ok(())
    }

    pub fn net_worth(&self) -> i64 {
        self.cash.saturating_add(self.bank)
    }
}

/// Partial update of a player row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<Amount>,
}

impl ValueObject for PlayerChanges {}

impl PlayerChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn cash(mut self, amount: Amount) -> Self {
        self.cash = Some(amount);
        self
    }

    pub fn bank(mut self, amount: Amount) -> Self {
        self.bank = Some(amount);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.cash.is_none() && self.bank.is_none()
    }

    /// Shape checks that do not need the stored row.
    pub fn validate(&self) -> DomainResult<()> {
        if self.is_empty() {
            return Err(DomainError::validation("player change-set is empty"));
        }
        if let Some(username) = &self.username {
            let trimmed = username.trim();
            if trimmed.is_empty() {
                return Err(DomainError::validation("username must not be blank"));
            }
            if trimmed.chars().count() > MAX_USERNAME_LEN {
                return Err(DomainError::validation(format!(
                    "username longer than {MAX_USERNAME_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}
