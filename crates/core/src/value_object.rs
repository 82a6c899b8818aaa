//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; they are defined entirely by their
//! attribute values. `Amount` and the change-sets in this crate are value objects.

/// Marker trait for value objects.
///
/// - **Value Object**: no identity (two wallet adjustments of `+500` are equal)
/// - **Entity**: has identity (two players with the same `PlayerId` are the same player)
///
/// Value objects are immutable: to "modify" one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
