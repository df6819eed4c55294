//! Image discovery: turns scan directories into typed [`Image`] records.

pub mod ignore;
pub mod walker;

pub use ignore::ExcludeRules;

use crate::error::{BuildError, Result};
use crate::image::Image;
use std::path::PathBuf;

/// Source of image definitions for a run.
pub trait ImageIndexer {
    /// Returns one `Image` per definition found under `dirs`, in scan order.
    fn index(&self, dirs: &[PathBuf]) -> Result<Vec<Image>>;
}

/// Finds `Dockerfile`s under each scan directory and reads their manifests.
#[derive(Debug, Clone, Default)]
pub struct DockerfileIndexer {
    exclude: ExcludeRules,
}

impl DockerfileIndexer {
    pub fn new(exclude: ExcludeRules) -> Self {
        Self { exclude }
    }
}

impl ImageIndexer for DockerfileIndexer {
    fn index(&self, dirs: &[PathBuf]) -> Result<Vec<Image>> {
        let mut images = Vec::new();

        for dir in dirs {
            if !dir.is_dir() {
                return Err(BuildError::Configuration(format!(
                    "scan directory {} does not exist",
                    dir.display()
                )));
            }

            let definitions = walker::find_definitions(dir, &self.exclude);
            tracing::info!(dir = %dir.display(), count = definitions.len(), "Scanned directory");

            for path in definitions {
                images.push(Image::from_definition(&path)?);
            }
        }

        Ok(images)
    }
}

/// Indexer over a fixed list of images, for callers that build the list themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticIndexer {
    images: Vec<Image>,
}

impl StaticIndexer {
    pub fn new(images: Vec<Image>) -> Self {
        Self { images }
    }
}

impl ImageIndexer for StaticIndexer {
    fn index(&self, _dirs: &[PathBuf]) -> Result<Vec<Image>> {
        Ok(self.images.clone())
    }
}
