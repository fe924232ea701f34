//! Rendering-ready projections of assets
//!
//! Decoding and scaling images is the presentation layer's business. The
//! engine only hands asset bytes to a [`Thumbnailer`] supplied at
//! construction and pairs the result with the asset name.

use crate::AssetName;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Turns asset bytes into a preview no larger than `max_pixel_size`
pub trait Thumbnailer: Send + Sync + fmt::Debug {
    fn thumbnail(&self, bytes: &[u8], max_pixel_size: u32) -> Option<Vec<u8>>;
}

/// Hands the asset bytes through unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughThumbnailer;

impl Thumbnailer for PassthroughThumbnailer {
    fn thumbnail(&self, bytes: &[u8], _max_pixel_size: u32) -> Option<Vec<u8>> {
        Some(bytes.to_vec())
    }
}

/// One list entry for the UI: an asset name plus its preview.
///
/// Identity is the name alone, so a reloaded projection replaces the old one.
#[derive(Debug, Clone)]
pub struct AssetProjection {
    pub name: AssetName,
    pub thumbnail: Option<Vec<u8>>,
}

impl AssetProjection {
    pub fn new(name: AssetName, thumbnail: Option<Vec<u8>>) -> Self {
        Self { name, thumbnail }
    }

    /// Placeholder used when removing an entry by name
    pub fn placeholder(name: AssetName) -> Self {
        Self {
            name,
            thumbnail: None,
        }
    }
}

impl PartialEq for AssetProjection {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for AssetProjection {}

impl Hash for AssetProjection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
