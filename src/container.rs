//! Cloud container layout
//!
//! A container root holds two scopes. Documents in the `Documents` scope are
//! user-visible; the `Data` scope is private to the app.

use crate::coordination::{write_coordinated, WritingOptions};
use crate::document::{Document, EngineContext};
use crate::error::Result;
use crate::metadata::scan_items;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Documents,
    Data,
}

impl Scope {
    pub fn dir_name(self) -> &'static str {
        match self {
            Scope::Documents => "Documents",
            Scope::Data => "Data",
        }
    }
}

const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone)]
pub struct Container {
    root: PathBuf,
    context: EngineContext,
}

impl Container {
    pub fn new(root: impl Into<PathBuf>, context: EngineContext) -> Self {
        Self {
            root: root.into(),
            context,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// `<root>/<scope>/<name>.<extension>`, with an empty name meaning "Untitled"
    pub fn document_url(&self, name: &str, scope: Scope) -> PathBuf {
        let name = if name.trim().is_empty() { UNTITLED } else { name };
        self.root
            .join(scope.dir_name())
            .join(format!("{}.{}", name, self.context.config.document_extension))
    }

    pub fn is_documents_scope(&self, url: &Path) -> bool {
        url.starts_with(self.root.join(Scope::Documents.dir_name()))
    }

    /// Engine handle for a document of this container
    pub fn document(&self, url: impl Into<PathBuf>) -> Document {
        Document::new(url, self.context.clone())
    }

    /// Create a document and close it again so it does not block other writers
    pub async fn create_document(&self, name: &str, scope: Scope) -> Result<Document> {
        let url = self.document_url(name, scope);
        if let Some(parent) = url.parent() {
            fs::create_dir_all(parent)?;
        }

        let document = self.document(url);
        document.create().await?;
        document.close().await?;
        Ok(document)
    }

    /// Remove a document package under a coordinated write
    pub async fn remove_document(&self, url: impl Into<PathBuf>) -> Result<()> {
        let url = url.into();
        let coordinator = self.context.coordinator.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            write_coordinated(&*coordinator, &url, WritingOptions::ForDeleting, |resolved| {
                tracing::debug!(url = %resolved.display(), "removing document");
                fs::remove_dir_all(resolved)
            })??;
            Ok(())
        })
        .await?
    }

    /// Every document package currently in the container
    pub fn document_urls(&self) -> Result<Vec<PathBuf>> {
        scan_items(&self.root, &self.context.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::state::DocumentState;

    fn container(root: &Path) -> Container {
        Container::new(root, EngineContext::local(root, EngineConfig::default()))
    }

    #[test]
    fn test_document_url_naming() {
        let container = container(Path::new("/icloud"));
        assert_eq!(
            container.document_url("Trip", Scope::Documents),
            PathBuf::from("/icloud/Documents/Trip.csdoc")
        );
        assert_eq!(
            container.document_url("", Scope::Data),
            PathBuf::from("/icloud/Data/Untitled.csdoc")
        );
    }

    #[test]
    fn test_scope_detection() {
        let container = container(Path::new("/icloud"));
        assert!(container.is_documents_scope(Path::new("/icloud/Documents/A.csdoc")));
        assert!(!container.is_documents_scope(Path::new("/icloud/Data/A.csdoc")));
        assert!(!container.is_documents_scope(Path::new("/elsewhere/Documents/A.csdoc")));
    }

    #[tokio::test]
    async fn test_create_and_remove_document() {
        let dir = tempfile::tempdir().unwrap();
        let container = container(dir.path());

        let document = container.create_document("Trip", Scope::Documents).await.unwrap();
        assert_eq!(document.state(), DocumentState::CLOSED);
        assert_eq!(container.document_urls().unwrap(), vec![document.url().to_path_buf()]);

        container.remove_document(document.url()).await.unwrap();
        assert!(container.document_urls().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let container = container(dir.path());

        container.create_document("Trip", Scope::Data).await.unwrap();
        assert!(container.create_document("Trip", Scope::Data).await.is_err());
    }
}
