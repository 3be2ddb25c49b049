//! Entity trait: identity + continuity across state changes.

use crate::id::OwnerId;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Owner of the row. Every stored entity belongs to exactly one owner.
    fn owner_id(&self) -> OwnerId;
}
