//! On-disk document package
//!
//! A package is a directory holding one descriptor entry plus one file per
//! asset, named by the asset's name. Nothing else is structurally required.

use crate::config::EngineConfig;
use crate::error::{DocumentError, Result};
use crate::revision::RevisionSnapshot;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Contents of the descriptor entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub version: u32,
}

/// Write a fresh package containing only the descriptor
pub fn create_package(path: &Path, config: &EngineConfig) -> Result<()> {
    if path.exists() {
        return Err(DocumentError::AlreadyExists(path.to_path_buf()));
    }
    fs::create_dir_all(path)?;
    let descriptor = PackageDescriptor {
        version: config.descriptor_version,
    };
    fs::write(
        path.join(&config.descriptor_file_name),
        serde_json::to_vec_pretty(&descriptor)?,
    )?;
    Ok(())
}

/// Parse the descriptor, failing with [`DocumentError::Corrupted`] when the
/// package is not a directory or the descriptor is missing or unreadable
pub fn read_descriptor(path: &Path, config: &EngineConfig) -> Result<PackageDescriptor> {
    if !path.is_dir() {
        return Err(corrupted(path, "package is not a directory"));
    }
    let descriptor_path = path.join(&config.descriptor_file_name);
    let raw = fs::read(&descriptor_path)
        .map_err(|e| corrupted(path, format!("missing descriptor: {}", e)))?;
    serde_json::from_slice(&raw).map_err(|e| corrupted(path, format!("invalid descriptor: {}", e)))
}

/// Snapshot of the package's assets and their modification times.
///
/// Only names and timestamps are read; asset bytes stay on disk.
pub fn read_snapshot(path: &Path, config: &EngineConfig) -> Result<RevisionSnapshot> {
    read_descriptor(path, config)?;

    let mut listing = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        listing.push((name, Timestamp::from(metadata.modified()?)));
    }
    Ok(RevisionSnapshot::from_listing(listing, config))
}

/// Modification time of a file or directory
pub fn modified_at(path: &Path) -> Result<Timestamp> {
    Ok(Timestamp::from(fs::metadata(path)?.modified()?))
}

/// Replace the contents of `target` with a copy of `source`.
///
/// Both are flat package directories; nested directories are skipped.
pub fn replace_package_contents(source: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        for entry in fs::read_dir(target)? {
            let entry = entry?;
            if entry.metadata()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
    } else {
        fs::create_dir_all(target)?;
    }
    copy_package_contents(source, target)
}

/// Copy every file of `source` into `target`
pub fn copy_package_contents(source: &Path, target: &Path) -> Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if entry.metadata()?.is_file() {
            fs::copy(entry.path(), target.join(entry.file_name()))?;
        }
    }
    Ok(())
}

fn corrupted(path: &Path, reason: impl Into<String>) -> DocumentError {
    DocumentError::Corrupted {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
