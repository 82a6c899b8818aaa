//! Character progression and jail state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, apply_non_negative};
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::PlayerId;
use crate::value_object::ValueObject;

/// Persisted per-player stats row (one row per player, keyed by the player id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub player_id: PlayerId,
    pub experience: i64,
    pub respect: i64,
    /// Police attention; drives arrest odds.
    pub heat: i64,
    pub crimes_committed: i64,
    pub jailed_until: Option<DateTime<Utc>>,
}

impl Entity for StatsRecord {
    type Id = PlayerId;

    fn id(&self) -> &Self::Id {
        &self.player_id
    }
}

impl StatsRecord {
    pub fn create(player_id: PlayerId, changes: &StatChanges) -> DomainResult<Self> {
        let mut record = Self {
            player_id,
            experience: 0,
            respect: 0,
            heat: 0,
            crimes_committed: 0,
            jailed_until: None,
        };
        record.apply(changes)?;
        Ok(record)
    }

    /// Apply a change-set. On error the record is left untouched.
    pub fn apply(&mut self, changes: &StatChanges) -> DomainResult<()> {
        let experience = apply_non_negative("experience", self.experience, changes.experience)?;
        let respect = apply_non_negative("respect", self.respect, changes.respect)?;
        let heat = apply_non_negative("heat", self.heat, changes.heat)?;
        let crimes_committed = apply_non_negative(
            "crimes_committed",
            self.crimes_committed,
            changes.crimes_committed,
        )?;

        self.experience = experience;
        self.respect = respect;
        self.heat = heat;
        self.crimes_committed = crimes_committed;
        match changes.jail {
            Some(JailChange::Until(at)) => self.jailed_until = Some(at),
            Some(JailChange::Release) => self.jailed_until = None,
            None => {}
        }
        Ok(())
    }

    pub fn is_jailed(&self, now: DateTime<Utc>) -> bool {
        self.jailed_until.is_some_and(|until| until > now)
    }
}

/// Jail column change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "at")]
pub enum JailChange {
    Until(DateTime<Utc>),
    Release,
}

/// Partial update of a stats row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respect: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crimes_committed: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jail: Option<JailChange>,
}

impl ValueObject for StatChanges {}

impl StatChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn experience(mut self, amount: Amount) -> Self {
        self.experience = Some(amount);
        self
    }

    pub fn respect(mut self, amount: Amount) -> Self {
        self.respect = Some(amount);
        self
    }

    pub fn heat(mut self, amount: Amount) -> Self {
        self.heat = Some(amount);
        self
    }

    pub fn crimes_committed(mut self, amount: Amount) -> Self {
        self.crimes_committed = Some(amount);
        self
    }

    pub fn jailed_until(mut self, until: DateTime<Utc>) -> Self {
        self.jail = Some(JailChange::Until(until));
        self
    }

    pub fn release(mut self) -> Self {
        self.jail = Some(JailChange::Release);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.experience.is_none()
            && self.respect.is_none()
            && self.heat.is_none()
            && self.crimes_committed.is_none()
            && self.jail.is_none()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.is_empty() {
            return Err(DomainError::validation("stat change-set is empty"));
        }
        Ok(())
    }
}
