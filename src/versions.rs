//! Revision version enumeration
//!
//! A document may carry divergent versions produced by concurrent writers.
//! The [`VersionStore`] enumerates them and can promote one to current or
//! discard every non-current version.
//!
//! [`LocalVersionStore`] keeps conflict versions in a sidecar directory:
//!
//! ```text
//! <root>/<document key>/current.json
//! <root>/<document key>/conflicts/<uuid>.json
//! <root>/<document key>/conflicts/<uuid>/...package files...
//! ```

use crate::error::{DocumentError, Result};
use crate::package;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One revision of a document as seen by one writer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVersion {
    pub id: Uuid,
    pub modified: Option<Timestamp>,
    /// Where the version's contents live
    pub location: PathBuf,
}

impl PartialEq for FileVersion {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FileVersion {}

pub trait VersionStore: Send + Sync + fmt::Debug {
    /// Version currently on disk, `None` when the document does not exist
    fn current_version(&self, path: &Path) -> Result<Option<FileVersion>>;

    /// Divergent versions not yet resolved, oldest first
    fn unresolved_conflict_versions(&self, path: &Path) -> Result<Vec<FileVersion>>;

    /// Make `version` the current contents of `path`
    fn replace_item(&self, version: &FileVersion, path: &Path) -> Result<()>;

    /// Discard every version of `path` except the current one
    fn remove_other_versions(&self, path: &Path) -> Result<()>;

    /// Record that the current version was modified at `modified`
    fn touch_current(&self, path: &Path, modified: Timestamp) -> Result<()>;

    fn has_unresolved_conflicts(&self, path: &Path) -> Result<bool> {
        Ok(!self.unresolved_conflict_versions(path)?.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionRecord {
    id: Uuid,
    modified: Option<Timestamp>,
}

/// Filesystem-backed version store
#[derive(Debug, Clone)]
pub struct LocalVersionStore {
    root: PathBuf,
}

impl LocalVersionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deposit a divergent version of `path` whose contents are copied from `source`
    pub fn record_conflict_version(
        &self,
        path: &Path,
        source: &Path,
        modified: Timestamp,
    ) -> Result<FileVersion> {
        let conflicts = self.conflicts_dir(path);
        let record = VersionRecord {
            id: Uuid::new_v4(),
            modified: Some(modified),
        };
        let location = conflicts.join(record.id.to_string());
        package::copy_package_contents(source, &location)?;
        write_record(&conflicts.join(format!("{}.json", record.id)), &record)?;

        tracing::debug!(path = %path.display(), id = %record.id, "recorded conflict version");
        Ok(FileVersion {
            id: record.id,
            modified: record.modified,
            location,
        })
    }

    fn document_dir(&self, path: &Path) -> PathBuf {
        let key: String = path
            .to_string_lossy()
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.root.join(key)
    }

    fn conflicts_dir(&self, path: &Path) -> PathBuf {
        self.document_dir(path).join("conflicts")
    }

    fn current_record_path(&self, path: &Path) -> PathBuf {
        self.document_dir(path).join("current.json")
    }

    /// Current record, created on first use so the current version keeps a stable id
    fn current_record(&self, path: &Path) -> Result<VersionRecord> {
        let record_path = self.current_record_path(path);
        if record_path.exists() {
            return read_record(&record_path);
        }
        let record = VersionRecord {
            id: Uuid::new_v4(),
            modified: Some(package::modified_at(path)?),
        };
        write_record(&record_path, &record)?;
        Ok(record)
    }
}

impl VersionStore for LocalVersionStore {
    fn current_version(&self, path: &Path) -> Result<Option<FileVersion>> {
        if !path.exists() {
            return Ok(None);
        }
        let record = self.current_record(path)?;
        Ok(Some(FileVersion {
            id: record.id,
            modified: record.modified,
            location: path.to_path_buf(),
        }))
    }

    fn unresolved_conflict_versions(&self, path: &Path) -> Result<Vec<FileVersion>> {
        let conflicts = self.conflicts_dir(path);
        if !conflicts.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in fs::read_dir(&conflicts)? {
            let entry = entry?;
            let record_path = entry.path();
            if record_path.extension().is_some_and(|ext| ext == "json") {
                let record = read_record(&record_path)?;
                versions.push(FileVersion {
                    id: record.id,
                    modified: record.modified,
                    location: conflicts.join(record.id.to_string()),
                });
            }
        }
        versions.sort_by(|a, b| a.modified.cmp(&b.modified).then(a.id.cmp(&b.id)));
        Ok(versions)
    }

    fn replace_item(&self, version: &FileVersion, path: &Path) -> Result<()> {
        if !version.location.is_dir() {
            return Err(DocumentError::Version(format!(
                "version {} has no contents at {}",
                version.id,
                version.location.display()
            )));
        }
        package::replace_package_contents(&version.location, path)?;

        let record = VersionRecord {
            id: version.id,
            modified: version.modified,
        };
        write_record(&self.current_record_path(path), &record)?;

        // The promoted version is current now, not a conflict
        let conflicts = self.conflicts_dir(path);
        let record_path = conflicts.join(format!("{}.json", version.id));
        if record_path.exists() {
            fs::remove_file(record_path)?;
        }
        let contents = conflicts.join(version.id.to_string());
        if contents.exists() {
            fs::remove_dir_all(contents)?;
        }
        Ok(())
    }

    fn remove_other_versions(&self, path: &Path) -> Result<()> {
        let conflicts = self.conflicts_dir(path);
        if conflicts.exists() {
            fs::remove_dir_all(&conflicts)?;
        }
        Ok(())
    }

    fn touch_current(&self, path: &Path, modified: Timestamp) -> Result<()> {
        let mut record = self.current_record(path)?;
        record.modified = Some(modified);
        write_record(&self.current_record_path(path), &record)
    }
}

fn read_record(path: &Path) -> Result<VersionRecord> {
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}

fn write_record(path: &Path, record: &VersionRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(record)?)?;
    Ok(())
}
