//! Document Engine
//!
//! One [`Document`] per open package. It owns the revision store, the
//! unsaved edit buffer, and the peer change set that has not reached the UI
//! yet, all behind a single [`AccessSerializer`].
//!
//! Every file-system operation runs on tokio's blocking pool inside a
//! coordinated read or write, and each async method reports its outcome as
//! a value. Nothing panics across an await.
//!
//! # Example
//!
//! ```no_run
//! use docsync_core::{Document, EngineConfig, EngineContext};
//!
//! # async fn demo() -> docsync_core::Result<()> {
//! let context = EngineContext::local("/tmp/container", EngineConfig::default());
//! let document = Document::new("/tmp/container/Documents/Trip.csdoc", context);
//!
//! document.open().await?;
//! document.add_pending_new("/tmp/cache/IMG_0001.jpg".into());
//! let report = document.save().await?;
//! assert!(report.is_success());
//!
//! let changes = document.take_peer_changes();
//! println!("{} peer changes", changes.len());
//! # Ok(())
//! # }
//! ```

use crate::access::AccessSerializer;
use crate::changes::ChangeSet;
use crate::config::EngineConfig;
use crate::coordination::{
    read_coordinated, write_coordinated, FileCoordinator, LocalCoordinator, ReadingOptions,
    WritingOptions,
};
use crate::edits::{reference_asset_name, UnsavedEdits};
use crate::error::{DocumentError, Result};
use crate::package;
use crate::projection::{AssetProjection, PassthroughThumbnailer, Thumbnailer};
use crate::resolver;
use crate::revision::{RevisionSnapshot, RevisionStore};
use crate::state::{DocumentState, StatePublisher};
use crate::versions::{LocalVersionStore, VersionStore};
use crate::AssetName;
use chrono::Utc;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Collaborators shared by every document of one container
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub coordinator: Arc<dyn FileCoordinator>,
    pub versions: Arc<dyn VersionStore>,
    pub thumbnailer: Arc<dyn Thumbnailer>,
}

impl EngineContext {
    /// In-process coordination and a version store under the container root
    pub fn local(container_root: impl AsRef<Path>, config: EngineConfig) -> Self {
        let versions_root = container_root.as_ref().join(&config.versions_dir_name);
        Self {
            coordinator: Arc::new(LocalCoordinator::new(config.document_extension.clone())),
            versions: Arc::new(LocalVersionStore::new(versions_root)),
            thumbnailer: Arc::new(PassthroughThumbnailer),
            config: Arc::new(config),
        }
    }

    pub fn with_thumbnailer(mut self, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        self.thumbnailer = thumbnailer;
        self
    }
}

/// Step of a save that touched a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStep {
    Delete,
    Copy,
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub name: String,
    pub step: SaveStep,
    pub message: String,
}

/// Aggregate outcome of a best-effort save
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub deleted: usize,
    pub copied: usize,
    pub failures: Vec<ItemFailure>,
}

impl SaveReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, name: impl Into<String>, step: SaveStep, error: impl ToString) {
        let failure = ItemFailure {
            name: name.into(),
            step,
            message: error.to_string(),
        };
        tracing::warn!(name = %failure.name, step = ?failure.step, error = %failure.message, "save step failed");
        self.failures.push(failure);
    }
}

#[derive(Debug, Default)]
struct Fields {
    revisions: RevisionStore,
    edits: UnsavedEdits,
    peer_changes: ChangeSet,
    discarded_peer_change_sets: usize,
}

#[derive(Debug)]
struct Shared {
    url: PathBuf,
    context: EngineContext,
    fields: AccessSerializer<Fields>,
    state: StatePublisher,
}

/// Handle to one document package; clones share the same engine
#[derive(Debug, Clone)]
pub struct Document {
    shared: Arc<Shared>,
}

impl Document {
    pub fn new(url: impl Into<PathBuf>, context: EngineContext) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                context,
                fields: AccessSerializer::new(Fields::default()),
                state: StatePublisher::new(DocumentState::CLOSED),
            }),
        }
    }

    pub fn url(&self) -> &Path {
        &self.shared.url
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.context.config
    }

    pub fn state(&self) -> DocumentState {
        self.shared.state.current()
    }

    /// Receiver notified on every state transition; drop it to unsubscribe
    pub fn subscribe_state(&self) -> watch::Receiver<DocumentState> {
        self.shared.state.subscribe()
    }

    /// Last committed snapshot, if the document was ever loaded or saved
    pub fn snapshot(&self) -> Option<Arc<RevisionSnapshot>> {
        self.shared.fields.read(|f| f.revisions.snapshot())
    }

    /// Write a new package holding only the descriptor, then load it
    pub async fn create(&self) -> Result<()> {
        self.run(|shared| shared.create()).await
    }

    /// Open the package. A corrupted package leaves the document closed.
    pub async fn open(&self) -> Result<()> {
        self.run(|shared| shared.open()).await
    }

    /// Save pending edits if any, then close. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        self.run(|shared| shared.close()).await
    }

    /// Flush the unsaved edits into the package
    pub async fn save(&self) -> Result<SaveReport> {
        self.run(|shared| shared.save()).await
    }

    /// Reload from disk, recording what peers changed
    pub async fn revert(&self) -> Result<()> {
        self.run(|shared| shared.revert()).await
    }

    /// A peer changed the package; reload unless closed
    pub async fn presented_item_did_change(&self) -> Result<()> {
        self.run(|shared| {
            if shared.state.current().contains(DocumentState::CLOSED) {
                return Ok(());
            }
            shared.revert()
        })
        .await
    }

    /// The package is about to be removed; close first if open
    pub async fn accommodate_deletion(&self) -> Result<()> {
        self.close().await
    }

    /// Keep the latest version, discard the rest. Returns true when the
    /// document was reverted to a peer's version.
    pub async fn resolve_conflicts(&self) -> Result<bool> {
        self.run(|shared| shared.resolve_conflicts()).await
    }

    /// Bytes of one asset, `None` when the file is not (yet) on disk
    pub async fn retrieve_asset(&self, name: impl Into<AssetName>) -> Option<Vec<u8>> {
        let name = name.into();
        self.run(move |shared| Ok(shared.retrieve_asset(&name)))
            .await
            .ok()
            .flatten()
    }

    /// Projections for `names`, or every asset when `None`
    pub async fn retrieve_projections(
        &self,
        names: Option<Vec<AssetName>>,
    ) -> Option<Vec<AssetProjection>> {
        self.run(move |shared| Ok(shared.retrieve_projections(names)))
            .await
            .ok()
            .flatten()
    }

    pub fn add_pending_new(&self, reference: PathBuf) {
        self.shared.fields.write(|f| f.edits.add_pending_new(reference));
    }

    pub fn remove_pending_new(&self, index: usize) -> Result<PathBuf> {
        self.shared.fields.write(|f| f.edits.remove_pending_new(index))
    }

    pub fn add_pending_deleted(&self, name: impl Into<AssetName>) {
        let name = name.into();
        self.shared.fields.write(|f| f.edits.add_pending_deleted(name));
    }

    pub fn pending_new(&self) -> Vec<PathBuf> {
        self.shared.fields.read(|f| f.edits.pending_new().to_vec())
    }

    pub fn pending_deleted(&self) -> BTreeSet<AssetName> {
        self.shared.fields.read(|f| f.edits.pending_deleted().clone())
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.shared.fields.read(|f| !f.edits.is_empty())
    }

    /// Peer changes not yet presented; stays set until cleared
    pub fn unconsumed_peer_changes(&self) -> ChangeSet {
        self.shared.fields.read(|f| f.peer_changes.clone())
    }

    pub fn clear_unconsumed_peer_changes(&self) {
        self.shared.fields.write(|f| f.peer_changes.clear());
    }

    /// Read and clear the peer changes in one step
    pub fn take_peer_changes(&self) -> ChangeSet {
        self.shared.fields.write(|f| std::mem::take(&mut f.peer_changes))
    }

    /// Loads that overwrote a change set the UI never consumed
    pub fn discarded_peer_change_sets(&self) -> usize {
        self.shared.fields.read(|f| f.discarded_peer_change_sets)
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Shared) -> Result<T> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || op(&shared)).await?
    }
}

impl Shared {
    fn config(&self) -> &EngineConfig {
        &self.context.config
    }

    fn coordinator(&self) -> &dyn FileCoordinator {
        &*self.context.coordinator
    }

    fn create(&self) -> Result<()> {
        tracing::debug!(url = %self.url.display(), "creating document");
        write_coordinated(self.coordinator(), &self.url, WritingOptions::Default, |resolved| {
            package::create_package(resolved, self.config())
        })??;
        self.open()
    }

    fn open(&self) -> Result<()> {
        // Closed and not already opening: claim the open in one state update
        let mut claimed = false;
        self.state.update(|s| {
            if s.contains(DocumentState::CLOSED) && !s.contains(DocumentState::EDITING_DISABLED) {
                s.insert(DocumentState::EDITING_DISABLED);
                claimed = true;
            }
        });
        if !claimed {
            return Ok(());
        }
        tracing::debug!(url = %self.url.display(), "opening document");

        if let Err(e) = self.load() {
            tracing::error!(url = %self.url.display(), error = %e, "failed to open document");
            self.state.update(|s| s.remove(DocumentState::EDITING_DISABLED));
            return Err(e);
        }

        let in_conflict = self.has_unresolved_conflicts();
        self.state.update(|s| {
            *s = DocumentState::NORMAL;
            s.set(DocumentState::IN_CONFLICT, in_conflict);
        });
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.state.current().contains(DocumentState::CLOSED) {
            return Ok(());
        }
        tracing::debug!(url = %self.url.display(), "closing document");

        let pending = self.fields.read(|f| !f.edits.is_empty());
        if pending {
            let report = self.save()?;
            if !report.is_success() {
                tracing::warn!(
                    url = %self.url.display(),
                    failures = report.failures.len(),
                    "closing after a partially failed save"
                );
            }
        }

        self.state.update(|s| *s = DocumentState::CLOSED);
        Ok(())
    }

    fn revert(&self) -> Result<()> {
        tracing::debug!(url = %self.url.display(), "reverting document");
        self.load()?;
        let in_conflict = self.has_unresolved_conflicts();
        self.state.update(|s| s.set(DocumentState::IN_CONFLICT, in_conflict));
        Ok(())
    }

    /// Read the package and record how it differs from the last snapshot
    fn load(&self) -> Result<()> {
        let snapshot = read_coordinated(
            self.coordinator(),
            &self.url,
            ReadingOptions::Default,
            |resolved| package::read_snapshot(resolved, self.config()),
        )??;

        self.fields.write(|f| {
            let changes = f.revisions.diff_against(&snapshot);
            if !f.peer_changes.is_empty() {
                // The UI has not presented the previous load yet; its changes are lost
                tracing::warn!(
                    url = %self.url.display(),
                    unconsumed = f.peer_changes.len(),
                    "loading document before peer changes were consumed"
                );
                f.discarded_peer_change_sets += 1;
            }
            f.peer_changes = changes;
            f.revisions.replace(snapshot);
        });
        Ok(())
    }

    fn save(&self) -> Result<SaveReport> {
        if self.state.current().contains(DocumentState::CLOSED) {
            return Err(DocumentError::NotOpen(self.url.clone()));
        }
        tracing::debug!(url = %self.url.display(), "saving document");

        let report = write_coordinated(
            self.coordinator(),
            &self.url,
            WritingOptions::ForMerging,
            |resolved| self.fulfill_unsaved_edits(resolved),
        )?;

        if let Err(e) = self.context.versions.touch_current(&self.url, Utc::now()) {
            tracing::warn!(url = %self.url.display(), error = %e, "failed to update version timestamp");
        }
        let failed = !report.is_success();
        self.state.update(|s| s.set(DocumentState::SAVING_ERROR, failed));
        Ok(report)
    }

    /// Apply deletions and copies best-effort, then re-snapshot from disk
    fn fulfill_unsaved_edits(&self, root: &Path) -> SaveReport {
        let edits = self.fields.write(|f| std::mem::take(&mut f.edits));
        let mut report = SaveReport::default();

        let config = self.config();
        for name in edits.pending_deleted() {
            if !config.is_asset_name(name) {
                report.fail(name.as_str(), SaveStep::Delete, "not an asset of the package");
                continue;
            }
            let target = root.join(name);
            if !target.exists() {
                continue;
            }
            match fs::remove_file(&target) {
                Ok(()) => report.deleted += 1,
                Err(e) => report.fail(name.as_str(), SaveStep::Delete, e),
            }
        }

        for reference in edits.pending_new() {
            let Some(name) = reference_asset_name(reference) else {
                report.fail(reference.display().to_string(), SaveStep::Copy, "reference has no file name");
                continue;
            };
            if !config.is_asset_name(&name) {
                report.fail(name, SaveStep::Copy, "not an asset of the package");
                continue;
            }
            match fs::copy(reference, root.join(&name)) {
                Ok(_) => report.copied += 1,
                Err(e) => report.fail(name, SaveStep::Copy, e),
            }
        }

        match package::read_snapshot(root, self.config()) {
            Ok(snapshot) => self.fields.write(|f| f.revisions.replace(snapshot)),
            Err(e) => report.fail(root.display().to_string(), SaveStep::Snapshot, e),
        }
        report
    }

    fn resolve_conflicts(&self) -> Result<bool> {
        let resolution =
            resolver::resolve(self.coordinator(), &*self.context.versions, &self.url)?;

        let is_open = !self.state.current().contains(DocumentState::CLOSED);
        if resolution.did_change_current && is_open {
            self.load()?;
        }
        self.state.update(|s| s.remove(DocumentState::IN_CONFLICT));
        Ok(resolution.did_change_current)
    }

    fn retrieve_asset(&self, name: &str) -> Option<Vec<u8>> {
        if !self.config().is_asset_name(name) {
            tracing::debug!(name, "refusing to read a non-asset entry");
            return None;
        }
        let path = self.url.join(name);
        let read = read_coordinated(
            self.coordinator(),
            &path,
            ReadingOptions::WithoutChanges,
            |resolved| fs::read(resolved),
        );
        match read {
            Ok(Ok(bytes)) => Some(bytes),
            Ok(Err(e)) => {
                tracing::debug!(name, error = %e, "asset not readable");
                None
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "coordinated read failed");
                None
            }
        }
    }

    fn retrieve_projections(&self, names: Option<Vec<AssetName>>) -> Option<Vec<AssetProjection>> {
        let snapshot = self.fields.read(|f| f.revisions.snapshot())?;
        let names = names.unwrap_or_else(|| snapshot.names().cloned().collect());
        let config = self.config();

        let projections = read_coordinated(
            self.coordinator(),
            &self.url,
            ReadingOptions::WithoutChanges,
            |root| {
                names
                    .iter()
                    .filter(|name| config.is_asset_name(name))
                    .filter_map(|name| {
                        let bytes = fs::read(root.join(name)).ok()?;
                        let thumbnail = self
                            .context
                            .thumbnailer
                            .thumbnail(&bytes, config.thumbnail_max_pixel_size);
                        Some(AssetProjection::new(name.clone(), thumbnail))
                    })
                    .collect::<Vec<_>>()
            },
        );

        match projections {
            Ok(items) if !items.is_empty() => Some(items),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(url = %self.url.display(), error = %e, "coordinated read failed");
                None
            }
        }
    }

    fn has_unresolved_conflicts(&self) -> bool {
        self.context
            .versions
            .has_unresolved_conflicts(&self.url)
            .unwrap_or_else(|e| {
                tracing::warn!(url = %self.url.display(), error = %e, "cannot enumerate versions");
                false
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeKind;
    use std::time::{Duration, SystemTime};

    fn context(root: &Path) -> EngineContext {
        EngineContext::local(root, EngineConfig::default())
    }

    fn set_mtime(path: &Path, secs: u64) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_opens_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let document = Document::new(dir.path().join("Doc.csdoc"), context(dir.path()));

        document.create().await.unwrap();

        assert!(document.state().is_normal());
        assert!(document.snapshot().unwrap().is_empty());
        assert!(document.unconsumed_peer_changes().is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_package_stays_closed() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("Broken.csdoc");
        fs::create_dir_all(&url).unwrap();

        let document = Document::new(&url, context(dir.path()));
        let err = document.open().await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(document.state(), DocumentState::CLOSED);
    }

    #[tokio::test]
    async fn test_removing_pending_new_registers_no_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let document = Document::new(dir.path().join("Doc.csdoc"), context(dir.path()));
        document.create().await.unwrap();

        document.add_pending_new(dir.path().join("a.png"));
        document.remove_pending_new(0).unwrap();

        assert!(document.pending_new().is_empty());
        assert!(document.pending_deleted().is_empty());
        assert!(!document.has_unsaved_changes());
        assert!(matches!(
            document.remove_pending_new(0),
            Err(DocumentError::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[tokio::test]
    async fn test_save_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let document = Document::new(dir.path().join("Doc.csdoc"), context(dir.path()));
        document.create().await.unwrap();

        let good = dir.path().join("good.png");
        fs::write(&good, b"good").unwrap();
        document.add_pending_new(dir.path().join("missing.png"));
        document.add_pending_new(good);
        document.add_pending_deleted("never-existed.png");

        let report = document.save().await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, SaveStep::Copy);
        assert_eq!(report.copied, 1);
        assert!(document.snapshot().unwrap().contains("good.png"));
        assert!(!document.has_unsaved_changes());
        assert!(document.state().contains(DocumentState::SAVING_ERROR));

        // A clean save clears the error flag
        let report = document.save().await.unwrap();
        assert!(report.is_success());
        assert!(!document.state().contains(DocumentState::SAVING_ERROR));
    }

    #[tokio::test]
    async fn test_save_requires_open_document() {
        let dir = tempfile::tempdir().unwrap();
        let document = Document::new(dir.path().join("Doc.csdoc"), context(dir.path()));
        assert!(matches!(document.save().await, Err(DocumentError::NotOpen(_))));
    }

    #[tokio::test]
    async fn test_unconsumed_peer_changes_are_discarded_on_reload() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("Doc.csdoc");
        let document = Document::new(&url, context(dir.path()));
        document.create().await.unwrap();

        fs::write(url.join("a.png"), b"a").unwrap();
        document.revert().await.unwrap();
        assert_eq!(
            document.unconsumed_peer_changes().kind_of("a.png"),
            Some(ChangeKind::New)
        );
        assert_eq!(document.discarded_peer_change_sets(), 0);

        fs::write(url.join("b.png"), b"b").unwrap();
        document.revert().await.unwrap();

        // Only the latest change set survives; "a.png" was never presented
        let changes = document.take_peer_changes();
        assert_eq!(changes.kind_of("b.png"), Some(ChangeKind::New));
        assert_eq!(changes.kind_of("a.png"), None);
        assert_eq!(document.discarded_peer_change_sets(), 1);
        assert!(document.unconsumed_peer_changes().is_empty());
    }

    #[tokio::test]
    async fn test_peer_update_detected_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("Doc.csdoc");
        package::create_package(&url, &EngineConfig::default()).unwrap();
        fs::write(url.join("a.png"), b"v1").unwrap();
        set_mtime(&url.join("a.png"), 1_000);

        let document = Document::new(&url, context(dir.path()));
        document.open().await.unwrap();
        document.clear_unconsumed_peer_changes();

        fs::write(url.join("a.png"), b"v2").unwrap();
        set_mtime(&url.join("a.png"), 2_000);
        document.presented_item_did_change().await.unwrap();

        let changes = document.take_peer_changes();
        assert_eq!(changes.kind_of("a.png"), Some(ChangeKind::Updated));
        assert_eq!(changes.len(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_missing_asset_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("Doc.csdoc");
        let document = Document::new(&url, context(dir.path()));
        document.create().await.unwrap();

        assert!(document.retrieve_asset("ghost.png").await.is_none());
        assert!(document.retrieve_projections(None).await.is_none());

        fs::write(url.join("real.png"), b"bytes").unwrap();
        assert_eq!(
            document.retrieve_asset("real.png").await,
            Some(b"bytes".to_vec())
        );
    }

    #[tokio::test]
    async fn test_projections_skip_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("Doc.csdoc");
        let document = Document::new(&url, context(dir.path()));
        document.create().await.unwrap();

        let source = dir.path().join("a.png");
        fs::write(&source, b"img").unwrap();
        document.add_pending_new(source);
        document.save().await.unwrap();

        let projections = document
            .retrieve_projections(Some(vec![
                "Description.plist".to_string(),
                "a.png".to_string(),
            ]))
            .await
            .unwrap();
        assert_eq!(projections.len(), 1);
        assert_eq!(projections[0].name, "a.png");
        assert_eq!(projections[0].thumbnail.as_deref(), Some(&b"img"[..]));
    }

    #[tokio::test]
    async fn test_close_flushes_edits_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("Doc.csdoc");
        let document = Document::new(&url, context(dir.path()));
        document.create().await.unwrap();

        let source = dir.path().join("late.png");
        fs::write(&source, b"late").unwrap();
        document.add_pending_new(source);

        document.close().await.unwrap();
        assert!(url.join("late.png").exists());
        assert_eq!(document.state(), DocumentState::CLOSED);

        document.close().await.unwrap();
        assert_eq!(document.state(), DocumentState::CLOSED);
    }

    #[tokio::test]
    async fn test_save_refuses_entries_outside_assets() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("Doc.csdoc");
        let document = Document::new(&url, context(dir.path()));
        document.create().await.unwrap();

        let victim = dir.path().join("victim.txt");
        fs::write(&victim, b"keep").unwrap();
        document.add_pending_deleted("Description.plist");
        document.add_pending_deleted("../victim.txt");
        document.add_pending_deleted(victim.display().to_string());

        let foreign = dir.path().join("incoming");
        fs::create_dir_all(&foreign).unwrap();
        fs::write(foreign.join("Description.plist"), b"not a descriptor").unwrap();
        document.add_pending_new(foreign.join("Description.plist"));

        let report = document.save().await.unwrap();

        assert_eq!(report.deleted, 0);
        assert_eq!(report.copied, 0);
        assert_eq!(report.failures.len(), 4);
        assert!(victim.exists());

        document.close().await.unwrap();
        document.open().await.unwrap();
        assert!(document.state().is_normal());
    }

    #[tokio::test]
    async fn test_retrieve_refuses_entries_outside_assets() {
        let dir = tempfile::tempdir().unwrap();
        let document = Document::new(dir.path().join("Doc.csdoc"), context(dir.path()));
        document.create().await.unwrap();
        fs::write(dir.path().join("secret.txt"), b"secret").unwrap();

        assert!(document.retrieve_asset("Description.plist").await.is_none());
        assert!(document.retrieve_asset("../secret.txt").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_opens_load_once() {
        for _ in 0..20 {
            let dir = tempfile::tempdir().unwrap();
            let url = dir.path().join("Doc.csdoc");
            package::create_package(&url, &EngineConfig::default()).unwrap();
            fs::write(url.join("a.png"), b"a").unwrap();

            let first = Document::new(&url, context(dir.path()));
            let second = first.clone();
            let (a, b) = tokio::join!(first.open(), second.open());
            a.unwrap();
            b.unwrap();

            assert_eq!(first.discarded_peer_change_sets(), 0);
            let changes = first.unconsumed_peer_changes();
            assert!(changes.new_names().contains("a.png"));
        }
    }
}
