//! Coordinated file access
//!
//! Every read or write of a document package goes through a
//! [`FileCoordinator`]. The coordinator guarantees that coordinated
//! accessors of the same item never run conflicting operations at the same
//! time, and hands the accessor the path it should actually use.
//!
//! [`LocalCoordinator`] provides this guarantee between threads of one
//! process. All paths inside a package share the package's lock, so reading
//! one asset waits for a save of the whole package.

use crate::error::{DocumentError, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Intent of a coordinated read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingOptions {
    Default,
    /// Read the item as it is, without asking other writers to flush first
    WithoutChanges,
}

/// Intent of a coordinated write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritingOptions {
    Default,
    /// The writer merges its changes into the current contents
    ForMerging,
    /// The writer is about to remove the item
    ForDeleting,
    /// Only metadata such as version information changes
    MetadataOnly,
}

/// Mutual exclusion between accessors of the same path
pub trait FileCoordinator: Send + Sync + fmt::Debug {
    /// Run `accessor` once a coordinated read of `path` is granted
    fn coordinate_reading(
        &self,
        path: &Path,
        options: ReadingOptions,
        accessor: &mut dyn FnMut(&Path),
    ) -> Result<()>;

    /// Run `accessor` once a coordinated write of `path` is granted
    fn coordinate_writing(
        &self,
        path: &Path,
        options: WritingOptions,
        accessor: &mut dyn FnMut(&Path),
    ) -> Result<()>;
}

/// Coordinated read returning the accessor's value
pub fn read_coordinated<T>(
    coordinator: &dyn FileCoordinator,
    path: &Path,
    options: ReadingOptions,
    accessor: impl FnOnce(&Path) -> T,
) -> Result<T> {
    let mut accessor = Some(accessor);
    let mut output = None;
    coordinator.coordinate_reading(path, options, &mut |resolved| {
        if let Some(accessor) = accessor.take() {
            output = Some(accessor(resolved));
        }
    })?;
    output.ok_or_else(|| not_invoked(path))
}

/// Coordinated write returning the accessor's value
pub fn write_coordinated<T>(
    coordinator: &dyn FileCoordinator,
    path: &Path,
    options: WritingOptions,
    accessor: impl FnOnce(&Path) -> T,
) -> Result<T> {
    let mut accessor = Some(accessor);
    let mut output = None;
    coordinator.coordinate_writing(path, options, &mut |resolved| {
        if let Some(accessor) = accessor.take() {
            output = Some(accessor(resolved));
        }
    })?;
    output.ok_or_else(|| not_invoked(path))
}

fn not_invoked(path: &Path) -> DocumentError {
    DocumentError::Coordination {
        path: path.to_path_buf(),
        reason: "coordinator did not invoke the accessor".to_string(),
    }
}

/// In-process coordinator keyed by document package
#[derive(Debug)]
pub struct LocalCoordinator {
    package_extension: String,
    locks: Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>,
}

impl LocalCoordinator {
    pub fn new(package_extension: impl Into<String>) -> Self {
        Self {
            package_extension: package_extension.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Item whose lock guards `path`: the enclosing package, or `path` itself
    fn coordination_key(&self, path: &Path) -> PathBuf {
        path.ancestors()
            .find(|ancestor| {
                ancestor
                    .extension()
                    .is_some_and(|ext| ext == self.package_extension.as_str())
            })
            .unwrap_or(path)
            .to_path_buf()
    }

    fn lock_for(&self, path: &Path) -> Result<(PathBuf, Arc<RwLock<()>>)> {
        if path.as_os_str().is_empty() {
            return Err(DocumentError::Coordination {
                path: path.to_path_buf(),
                reason: "empty path".to_string(),
            });
        }
        let key = self.coordination_key(path);
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(locks.entry(key.clone()).or_default());
        Ok((key, lock))
    }

    /// Drop the map entry once no accessor holds or waits on it
    fn release(&self, key: &Path, lock: Arc<RwLock<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(key).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_items(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl FileCoordinator for LocalCoordinator {
    fn coordinate_reading(
        &self,
        path: &Path,
        options: ReadingOptions,
        accessor: &mut dyn FnMut(&Path),
    ) -> Result<()> {
        let (key, lock) = self.lock_for(path)?;
        {
            let _guard = lock.read().unwrap_or_else(PoisonError::into_inner);
            tracing::trace!(path = %path.display(), ?options, "coordinated read granted");
            accessor(path);
        }
        self.release(&key, lock);
        Ok(())
    }

    fn coordinate_writing(
        &self,
        path: &Path,
        options: WritingOptions,
        accessor: &mut dyn FnMut(&Path),
    ) -> Result<()> {
        let (key, lock) = self.lock_for(path)?;
        {
            let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);
            tracing::trace!(path = %path.display(), ?options, "coordinated write granted");
            accessor(path);
        }
        self.release(&key, lock);
        Ok(())
    }
}
