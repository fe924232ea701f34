//! DocSync Core - Change tracking and conflict resolution for document packages
//!
//! A document is a package directory holding a descriptor plus one file per
//! asset. Peers edit copies of the package on other devices and a cloud
//! provider syncs them back. This crate implements:
//! - Revision snapshots and the diff into new/deleted/updated assets
//! - A buffer of local edits flushed by a best-effort save
//! - Reader/writer serialization of a document's internal state
//! - Coordinated file access around every read and write
//! - Last-writer-wins resolution of conflicting versions
//!
//! # Examples
//!
//! ```rust
//! use docsync_core::revision::{diff, RevisionSnapshot};
//! use docsync_core::ChangeKind;
//! use chrono::Utc;
//!
//! let now = Utc::now();
//! let old = RevisionSnapshot::new();
//! let new = RevisionSnapshot::from_iter([("photo.png".to_string(), now)]);
//!
//! let changes = diff(Some(&old), &new);
//! assert_eq!(changes.kind_of("photo.png"), Some(ChangeKind::New));
//! ```

pub mod access;
pub mod changes;
pub mod config;
pub mod container;
pub mod coordination;
pub mod document;
pub mod edits;
pub mod error;
pub mod metadata;
pub mod package;
pub mod projection;
pub mod resolver;
pub mod revision;
pub mod state;
pub mod telemetry;
pub mod versions;

// Re-exports for convenience
pub use changes::{ChangeKind, ChangeSet};
pub use config::EngineConfig;
pub use container::{Container, Scope};
pub use document::{Document, EngineContext, SaveReport};
pub use error::{DocumentError, Result};
pub use state::DocumentState;

/// Stable name of an asset inside a document package
pub type AssetName = String;

/// Modification timestamp of assets and versions
pub type Timestamp = chrono::DateTime<chrono::Utc>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_import() {
        // Smoke test that modules compile
        let _name: AssetName = "photo.png".to_string();
        assert!(ChangeSet::new().is_empty());
    }
}
