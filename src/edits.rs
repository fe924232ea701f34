//! Unsaved Edit Buffer: local edits the next save will flush
//!
//! New assets are kept as external references (paths outside the package)
//! because their bytes have not been copied in yet. Deletions are kept by
//! asset name.

use crate::error::{DocumentError, Result};
use crate::AssetName;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsavedEdits {
    pending_new: Vec<PathBuf>,
    pending_deleted: BTreeSet<AssetName>,
}

impl UnsavedEdits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pending_new(&mut self, reference: PathBuf) {
        self.pending_new.push(reference);
    }

    /// Drop a pending-new reference. The asset never reached a saved
    /// revision, so no deletion is recorded for it.
    pub fn remove_pending_new(&mut self, index: usize) -> Result<PathBuf> {
        if index >= self.pending_new.len() {
            return Err(DocumentError::IndexOutOfRange {
                index,
                len: self.pending_new.len(),
            });
        }
        Ok(self.pending_new.remove(index))
    }

    pub fn add_pending_deleted(&mut self, name: AssetName) {
        self.pending_deleted.insert(name);
    }

    pub fn pending_new(&self) -> &[PathBuf] {
        &self.pending_new
    }

    pub fn pending_deleted(&self) -> &BTreeSet<AssetName> {
        &self.pending_deleted
    }

    pub fn is_empty(&self) -> bool {
        self.pending_new.is_empty() && self.pending_deleted.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending_new.clear();
        self.pending_deleted.clear();
    }
}

/// Name an external reference takes once copied into the package
pub fn reference_asset_name(reference: &Path) -> Option<AssetName> {
    reference
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}
