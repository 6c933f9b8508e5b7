//! Entity trait: identity + continuity across state changes.
//!
//! Users, courses and modules are entities: two snapshots of the same course
//! with different titles are still the same course.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
