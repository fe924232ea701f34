//! Storage Metadata Feed
//!
//! The storage provider pushes "item list changed" events; the engine never
//! polls. [`MetadataFeed`] fans the events out to subscribers over a tokio
//! broadcast channel. With the `watch` feature, [`FolderWatcher`] turns
//! file-system notifications under a container root into such events.

use crate::config::EngineConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;
use walkdir::{DirEntry, WalkDir};

/// One document visible in the container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataItem {
    pub name: String,
    pub url: PathBuf,
    /// Opaque provider handle, stable for the lifetime of the feed
    pub handle: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataEvent {
    /// Current complete list of items, sorted by url
    ItemsChanged(Vec<MetadataItem>),
}

/// Broadcast publisher of metadata events
#[derive(Debug)]
pub struct MetadataFeed {
    sender: broadcast::Sender<MetadataEvent>,
    handles: Mutex<HashMap<PathBuf, Uuid>>,
}

impl MetadataFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Receiver of future events; drop it to unsubscribe
    pub fn subscribe(&self) -> broadcast::Receiver<MetadataEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish the current list of document urls. Returns the number of
    /// subscribers reached.
    pub fn publish(&self, urls: Vec<PathBuf>) -> usize {
        let items = self.items_for(urls);
        match self.sender.send(MetadataEvent::ItemsChanged(items)) {
            Ok(reached) => reached,
            Err(_) => {
                tracing::trace!("metadata event dropped, no subscribers");
                0
            }
        }
    }

    /// Attach stable handles, reusing the handle of a url seen before
    fn items_for(&self, mut urls: Vec<PathBuf>) -> Vec<MetadataItem> {
        urls.sort();
        urls.dedup();
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|url, _| urls.contains(url));

        urls.into_iter()
            .map(|url| {
                let handle = *handles.entry(url.clone()).or_insert_with(Uuid::new_v4);
                let name = url
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                MetadataItem { name, url, handle }
            })
            .collect()
    }
}

/// Every document package under `root`. Hidden entries are skipped and a
/// package's own contents are never descended into.
pub fn scan_items(root: &Path, config: &EngineConfig) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !root.exists() {
        return Ok(found);
    }

    let mut entries = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));
    while let Some(entry) = entries.next() {
        let entry = entry.map_err(std::io::Error::from)?;
        let is_package = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == config.document_extension.as_str());
        if !is_package {
            continue;
        }
        if entry.file_type().is_dir() {
            entries.skip_current_dir();
        }
        found.push(entry.into_path());
    }

    found.sort();
    Ok(found)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

#[cfg(feature = "watch")]
pub use watcher::FolderWatcher;

#[cfg(feature = "watch")]
mod watcher {
    use super::{scan_items, MetadataFeed};
    use crate::config::EngineConfig;
    use crate::error::Result;
    use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Publishes a fresh item list whenever something changes under the root
    pub struct FolderWatcher {
        _watcher: RecommendedWatcher,
        feed: Arc<MetadataFeed>,
    }

    impl FolderWatcher {
        pub fn new(root: PathBuf, config: Arc<EngineConfig>, feed: Arc<MetadataFeed>) -> Result<Self> {
            std::fs::create_dir_all(&root)?;

            let watch_root = root.clone();
            let publisher = Arc::clone(&feed);
            let mut watcher = RecommendedWatcher::new(
                move |res: notify::Result<Event>| match res {
                    Ok(_) => match scan_items(&watch_root, &config) {
                        Ok(urls) => {
                            publisher.publish(urls);
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to scan container"),
                    },
                    Err(e) => tracing::warn!(error = %e, "watch error"),
                },
                Config::default(),
            )?;
            watcher.watch(&root, RecursiveMode::Recursive)?;

            Ok(Self {
                _watcher: watcher,
                feed,
            })
        }

        pub fn feed(&self) -> &Arc<MetadataFeed> {
            &self.feed
        }
    }
}
