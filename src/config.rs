//! Engine configuration
//!
//! Defaults match the package layout written by [`crate::package::create_package`].
//! A JSON file may override any subset of the fields.

use crate::error::{DocumentError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// Tunables shared by every document opened with the same engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Extension (without the dot) of document packages
    pub document_extension: String,

    /// Name of the descriptor entry every package must contain
    pub descriptor_file_name: String,

    /// Format version written into new descriptors
    pub descriptor_version: u32,

    /// Upper bound passed to the thumbnailer
    pub thumbnail_max_pixel_size: u32,

    /// Extra entry names never classified as assets
    pub excluded_names: Vec<String>,

    /// Sidecar directory (inside the container root) holding conflict versions
    pub versions_dir_name: String,

    /// Buffered events per metadata feed subscriber
    pub metadata_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            document_extension: "csdoc".to_string(),
            descriptor_file_name: "Description.plist".to_string(),
            descriptor_version: 1,
            thumbnail_max_pixel_size: 128,
            excluded_names: Vec::new(),
            versions_dir_name: ".versions".to_string(),
            metadata_channel_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file, filling missing fields with defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make packages unreadable
    pub fn validate(&self) -> Result<()> {
        if self.document_extension.trim().is_empty() {
            return Err(DocumentError::Config(
                "document_extension must not be empty".to_string(),
            ));
        }
        if self.descriptor_file_name.trim().is_empty() {
            return Err(DocumentError::Config(
                "descriptor_file_name must not be empty".to_string(),
            ));
        }
        if self.metadata_channel_capacity == 0 {
            return Err(DocumentError::Config(
                "metadata_channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether an entry name takes part in change classification.
    ///
    /// The descriptor, hidden files and configured exclusions are infrastructure.
    /// A name must also be a single plain path component, so joining it onto
    /// a package root never leaves the package.
    pub fn is_asset_name(&self, name: &str) -> bool {
        let mut components = Path::new(name).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        single
            && name != self.descriptor_file_name
            && !name.starts_with('.')
            && !self.excluded_names.iter().any(|excluded| excluded == name)
    }
}
