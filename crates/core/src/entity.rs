//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Products and repairs are entities: two records with the same identifier are
/// the same record, whatever their other fields say.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;

    /// Whether `other` refers to the same record.
    fn same_identity_as(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
