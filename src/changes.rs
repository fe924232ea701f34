//! Change Set: classification of asset names relative to a prior revision
//!
//! A change set is produced by [`crate::revision::diff`], handed to the UI
//! collaborator once, then cleared. The three sets are kept pairwise
//! disjoint: inserting a name under one kind removes it from the others.

use crate::AssetName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of change an asset went through between two revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeKind {
    New,
    Deleted,
    Updated,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 3] = [ChangeKind::New, ChangeKind::Deleted, ChangeKind::Updated];
}

/// New, deleted, and updated asset names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    new: BTreeSet<AssetName>,
    deleted: BTreeSet<AssetName>,
    updated: BTreeSet<AssetName>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` under `kind`, moving it out of any other kind
    pub fn insert(&mut self, kind: ChangeKind, name: AssetName) {
        for other in ChangeKind::ALL {
            if other != kind {
                self.set_mut(other).remove(&name);
            }
        }
        self.set_mut(kind).insert(name);
    }

    /// Drop `name` from every kind. Returns true if it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let mut removed = false;
        for kind in ChangeKind::ALL {
            removed |= self.set_mut(kind).remove(name);
        }
        removed
    }

    pub fn names(&self, kind: ChangeKind) -> &BTreeSet<AssetName> {
        match kind {
            ChangeKind::New => &self.new,
            ChangeKind::Deleted => &self.deleted,
            ChangeKind::Updated => &self.updated,
        }
    }

    pub fn new_names(&self) -> &BTreeSet<AssetName> {
        &self.new
    }

    pub fn deleted_names(&self) -> &BTreeSet<AssetName> {
        &self.deleted
    }

    pub fn updated_names(&self) -> &BTreeSet<AssetName> {
        &self.updated
    }

    /// Kind recorded for `name`, if any
    pub fn kind_of(&self, name: &str) -> Option<ChangeKind> {
        ChangeKind::ALL
            .into_iter()
            .find(|kind| self.names(*kind).contains(name))
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.deleted.is_empty() && self.updated.is_empty()
    }

    /// Total number of classified names
    pub fn len(&self) -> usize {
        self.new.len() + self.deleted.len() + self.updated.len()
    }

    pub fn clear(&mut self) {
        self.new.clear();
        self.deleted.clear();
        self.updated.clear();
    }

    fn set_mut(&mut self, kind: ChangeKind) -> &mut BTreeSet<AssetName> {
        match kind {
            ChangeKind::New => &mut self.new,
            ChangeKind::Deleted => &mut self.deleted,
            ChangeKind::Updated => &mut self.updated,
        }
    }
}
