//! Sync scopes.
//!
//! A scope says how much of the layout a sync pass has to rewrite. Scopes
//! from coalesced requests are merged so one pass covers all of them.

use pledgehub_common::Collection;
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncScope {
    /// Full reconciliation of collections, shards and `db.json`
    Full,
    /// Rewrite only these flat, non-project collections plus `db.json`
    Flat(BTreeSet<Collection>),
}

impl SyncScope {
    /// Scope for a write that touched `collection`.
    ///
    /// Unless `scoped` is set every write gets a full pass. Project and
    /// donation writes always do, since they move donations between shards.
    #[must_use]
    pub fn for_collection(collection: Collection, scoped: bool) -> Self {
        match collection {
            Collection::Feedback | Collection::Admins if scoped => {
                Self::Flat(BTreeSet::from([collection]))
            }
            _ => Self::Full,
        }
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }

    /// Union of two scopes; `Full` absorbs everything.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Flat(mut a), Self::Flat(b)) => {
                a.extend(b);
                Self::Flat(a)
            }
            _ => Self::Full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unscoped_is_always_full() {
        for collection in Collection::ALL {
            assert!(SyncScope::for_collection(collection, false).is_full());
        }
    }

    #[test]
    fn test_scoped_only_narrows_flat_side_collections() {
        assert!(SyncScope::for_collection(Collection::Projects, true).is_full());
        assert!(SyncScope::for_collection(Collection::Donations, true).is_full());
        assert_eq!(
            SyncScope::for_collection(Collection::Feedback, true),
            SyncScope::Flat(BTreeSet::from([Collection::Feedback]))
        );
    }

    #[test]
    fn test_merge() {
        let feedback = SyncScope::for_collection(Collection::Feedback, true);
        let admins = SyncScope::for_collection(Collection::Admins, true);
        assert_eq!(
            feedback.clone().merge(admins),
            SyncScope::Flat(BTreeSet::from([Collection::Feedback, Collection::Admins]))
        );
        assert!(feedback.merge(SyncScope::Full).is_full());
    }
}
