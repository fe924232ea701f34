//! Conflict Resolver: last-writer-wins at whole-document granularity
//!
//! The latest version becomes current and every other version is thrown
//! away. Nothing is merged, so edits carried only by a losing version are
//! lost.

use crate::coordination::{write_coordinated, FileCoordinator, WritingOptions};
use crate::error::{DocumentError, Result};
use crate::versions::{FileVersion, VersionStore};
use std::path::Path;

/// Outcome of a resolution pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub winner: FileVersion,
    /// True when a conflict version replaced the current one; the open
    /// document must then be reverted from disk
    pub did_change_current: bool,
}

/// Latest version among `current` and `conflicts`.
///
/// Only a strictly later timestamp displaces the incumbent. Versions are
/// compared only when both carry a timestamp, so an undated version never
/// wins and an undated incumbent is never displaced.
pub fn pick_winner<'a>(current: &'a FileVersion, conflicts: &'a [FileVersion]) -> &'a FileVersion {
    let mut winner = current;
    for version in conflicts {
        if let (Some(candidate), Some(best)) = (version.modified, winner.modified) {
            if candidate > best {
                winner = version;
            }
        }
    }
    winner
}

/// Resolve the conflicts of the document at `path` under a coordinated write
pub fn resolve(
    coordinator: &dyn FileCoordinator,
    versions: &dyn VersionStore,
    path: &Path,
) -> Result<Resolution> {
    write_coordinated(coordinator, path, WritingOptions::MetadataOnly, |resolved| {
        resolve_at(versions, resolved)
    })?
}

fn resolve_at(versions: &dyn VersionStore, path: &Path) -> Result<Resolution> {
    let current = versions.current_version(path)?.ok_or_else(|| {
        DocumentError::Version(format!("no current version of {}", path.display()))
    })?;
    let conflicts = versions.unresolved_conflict_versions(path)?;

    let winner = pick_winner(&current, &conflicts).clone();
    let did_change_current = winner != current;
    if did_change_current {
        tracing::info!(path = %path.display(), winner = %winner.id, "promoting conflict version");
        versions.replace_item(&winner, path)?;
    }
    versions.remove_other_versions(path)?;

    Ok(Resolution {
        winner,
        did_change_current,
    })
}
