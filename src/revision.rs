//! Revision snapshots and the diff that turns two snapshots into a [`ChangeSet`]
//!
//! A snapshot only records asset names and modification timestamps. Asset
//! bytes are never kept resident; retrieval goes back to disk.
//!
//! # Example
//!
//! ```
//! use docsync_core::revision::{diff, RevisionSnapshot};
//! use chrono::{TimeZone, Utc};
//!
//! let t1 = Utc.timestamp_opt(1, 0).unwrap();
//! let t2 = Utc.timestamp_opt(2, 0).unwrap();
//!
//! let old = RevisionSnapshot::from_iter([("a".to_string(), t1), ("b".to_string(), t1)]);
//! let new = RevisionSnapshot::from_iter([("a".to_string(), t1), ("c".to_string(), t2)]);
//!
//! let changes = diff(Some(&old), &new);
//! assert!(changes.deleted_names().contains("b"));
//! assert!(changes.new_names().contains("c"));
//! assert!(changes.updated_names().is_empty());
//! ```

use crate::changes::{ChangeKind, ChangeSet};
use crate::config::EngineConfig;
use crate::{AssetName, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable view of a document's assets at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSnapshot {
    entries: BTreeMap<AssetName, Timestamp>,
}

impl RevisionSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a raw package listing, dropping infrastructure entries
    pub fn from_listing<I>(listing: I, config: &EngineConfig) -> Self
    where
        I: IntoIterator<Item = (AssetName, Timestamp)>,
    {
        listing
            .into_iter()
            .filter(|(name, _)| config.is_asset_name(name))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Timestamp> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &AssetName> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetName, &Timestamp)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(AssetName, Timestamp)> for RevisionSnapshot {
    fn from_iter<T: IntoIterator<Item = (AssetName, Timestamp)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Classify every name of `new` relative to `old`.
///
/// - No prior snapshot (or an empty one): everything in `new` is new.
/// - Names only in `old` are deleted.
/// - Names in both are updated when the new timestamp is strictly later.
pub fn diff(old: Option<&RevisionSnapshot>, new: &RevisionSnapshot) -> ChangeSet {
    let mut changes = ChangeSet::new();

    let old = match old {
        Some(old) if !old.is_empty() => old,
        _ => {
            for name in new.names() {
                changes.insert(ChangeKind::New, name.clone());
            }
            return changes;
        }
    };

    // Every old name is a deletion candidate until seen in the new snapshot
    for name in old.names() {
        changes.insert(ChangeKind::Deleted, name.clone());
    }
    if new.is_empty() {
        return changes;
    }

    for (name, new_modified) in new.iter() {
        match old.get(name) {
            None => changes.insert(ChangeKind::New, name.clone()),
            Some(old_modified) if new_modified > old_modified => {
                changes.insert(ChangeKind::Updated, name.clone())
            }
            Some(_) => {
                changes.remove(name);
            }
        }
    }

    changes
}

/// Last-known committed snapshot of one document
#[derive(Debug, Clone, Default)]
pub struct RevisionStore {
    current: Option<Arc<RevisionSnapshot>>,
}

impl RevisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, if the document has been loaded or saved
    pub fn snapshot(&self) -> Option<Arc<RevisionSnapshot>> {
        self.current.clone()
    }

    /// Diff an incoming snapshot against the stored one
    pub fn diff_against(&self, incoming: &RevisionSnapshot) -> ChangeSet {
        diff(self.current.as_deref(), incoming)
    }

    /// Swap in a fully prepared snapshot
    pub fn replace(&mut self, snapshot: RevisionSnapshot) {
        self.current = Some(Arc::new(snapshot));
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn snapshot(entries: &[(&str, i64)]) -> RevisionSnapshot {
        entries
            .iter()
            .map(|(name, secs)| (name.to_string(), at(*secs)))
            .collect()
    }

    #[test]
    fn test_diff_example() {
        let old = snapshot(&[("a", 1), ("b", 1)]);
        let new = snapshot(&[("a", 1), ("c", 2)]);

        let changes = diff(Some(&old), &new);

        let mut expected = ChangeSet::new();
        expected.insert(ChangeKind::Deleted, "b".to_string());
        expected.insert(ChangeKind::New, "c".to_string());
        assert_eq!(changes, expected);
    }

    #[test]
    fn test_diff_without_prior_snapshot() {
        let new = snapshot(&[("a", 1), ("b", 2)]);

        let changes = diff(None, &new);
        assert_eq!(changes.new_names().len(), 2);
        assert!(changes.deleted_names().is_empty());
        assert!(changes.updated_names().is_empty());

        let empty = RevisionSnapshot::new();
        assert_eq!(diff(Some(&empty), &new), changes);
    }

    #[test]
    fn test_diff_to_empty_deletes_everything() {
        let old = snapshot(&[("a", 1), ("b", 2)]);
        let changes = diff(Some(&old), &RevisionSnapshot::new());

        assert_eq!(changes.deleted_names().len(), 2);
        assert!(changes.new_names().is_empty());
        assert!(changes.updated_names().is_empty());
    }

    #[test]
    fn test_diff_updated_requires_strictly_later() {
        let old = snapshot(&[("a", 5), ("b", 5)]);
        let new = snapshot(&[("a", 6), ("b", 4)]);

        let changes = diff(Some(&old), &new);
        assert_eq!(changes.kind_of("a"), Some(ChangeKind::Updated));
        assert_eq!(changes.kind_of("b"), None);
    }

    #[test]
    fn test_from_listing_filters_infrastructure() {
        let config = EngineConfig::default();
        let listing = vec![
            ("Description.plist".to_string(), at(1)),
            (".DS_Store".to_string(), at(1)),
            ("photo.png".to_string(), at(1)),
        ];

        let snapshot = RevisionSnapshot::from_listing(listing, &config);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("photo.png"));
    }

    #[test]
    fn test_store_replace_is_whole_snapshot() {
        let mut store = RevisionStore::new();
        assert!(store.snapshot().is_none());

        let first = snapshot(&[("a", 1)]);
        store.replace(first.clone());
        let held = store.snapshot().unwrap();

        store.replace(snapshot(&[("b", 2)]));

        // Earlier readers keep the snapshot they observed
        assert_eq!(*held, first);
        assert!(store.snapshot().unwrap().contains("b"));
    }

    fn arb_snapshot() -> impl Strategy<Value = RevisionSnapshot> {
        proptest::collection::btree_map("[a-f]{1,2}", 0i64..10, 0..12)
            .prop_map(|entries| entries.into_iter().map(|(name, secs)| (name, at(secs))).collect())
    }

    proptest! {
        #[test]
        fn prop_diff_partitions_new_snapshot(old in arb_snapshot(), new in arb_snapshot()) {
            let changes = diff(Some(&old), &new);

            let new_names: BTreeSet<_> = new.names().cloned().collect();
            let old_names: BTreeSet<_> = old.names().cloned().collect();

            // Deleted names are exactly those that vanished (or all old names when new is empty)
            let vanished: BTreeSet<_> = old_names.difference(&new_names).cloned().collect();
            if old.is_empty() {
                prop_assert!(changes.deleted_names().is_empty());
            } else {
                prop_assert_eq!(changes.deleted_names(), &vanished);
            }

            // New + updated + unchanged reconstructs the new snapshot
            let unchanged: BTreeSet<_> = new_names
                .iter()
                .filter(|name| changes.kind_of(name).is_none())
                .cloned()
                .collect();
            let mut rebuilt: BTreeSet<_> = changes.new_names().clone();
            rebuilt.extend(changes.updated_names().iter().cloned());
            rebuilt.extend(unchanged);
            prop_assert_eq!(rebuilt, new_names);

            prop_assert!(changes.new_names().is_disjoint(changes.updated_names()));
            prop_assert!(changes.new_names().is_disjoint(changes.deleted_names()));
            prop_assert!(changes.updated_names().is_disjoint(changes.deleted_names()));
        }

        #[test]
        fn prop_diff_with_itself_is_empty(old in arb_snapshot()) {
            prop_assert!(diff(Some(&old), &old).is_empty());
        }

        #[test]
        fn prop_diff_from_nothing_is_all_new(new in arb_snapshot()) {
            let changes = diff(None, &new);
            prop_assert_eq!(changes.new_names().len(), new.len());
            prop_assert!(changes.deleted_names().is_empty());
            prop_assert!(changes.updated_names().is_empty());
        }

        #[test]
        fn prop_diff_to_nothing_is_all_deleted(old in arb_snapshot()) {
            let changes = diff(Some(&old), &RevisionSnapshot::new());
            prop_assert_eq!(changes.deleted_names().len(), old.len());
            prop_assert!(changes.new_names().is_empty());
            prop_assert!(changes.updated_names().is_empty());
        }
    }
}
