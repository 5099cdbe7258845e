//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stored records expose their store-assigned id through this trait so
/// association rows can be built from ids alone.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
