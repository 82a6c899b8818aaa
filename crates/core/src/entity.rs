//! Entity trait: identity + continuity across writes.

/// A persisted game record addressed by a stable key.
///
/// Stores key their tables by `Entity::Id`, so the id must be cheap to clone
/// and hashable.
pub trait Entity {
    /// Strongly-typed record key.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the record key.
    fn id(&self) -> &Self::Id;
}
