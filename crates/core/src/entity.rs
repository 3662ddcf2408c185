//! Entity trait: identity + continuity across runs.

/// Entity marker + minimal interface.
///
/// Destination stores upsert records keyed by `id()`, so two values with the
/// same id describe the same logical item regardless of their other fields.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
