//! `syndicate-core`: game domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed ids, the records the bot persists, and the change-sets that describe
//! writes against them.

pub mod action_log;
pub mod amount;
pub mod entity;
pub mod error;
pub mod id;
pub mod player;
pub mod stats;
pub mod value_object;

pub use action_log::ActionLogEntry;
pub use amount::Amount;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ActionLogId, PlayerId};
pub use player::{PlayerChanges, PlayerRecord};
pub use stats::{JailChange, StatChanges, StatsRecord};
pub use value_object::ValueObject;
