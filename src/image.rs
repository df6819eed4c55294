use crate::constants::MANIFEST_FILE_NAME;
use crate::docker::{self, Instruction};
use crate::error::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Per-image build settings read from `manifest.json` next to the Dockerfile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageManifest {
    /// Tag given to the image by `docker build -t`; also its name in the graph
    #[serde(default)]
    pub local_tag: Option<String>,
    /// Repository path under each registry the image is pushed to
    #[serde(default)]
    pub registry_tag: Option<String>,
    /// Extra `docker build` options, e.g. `{"--network": "host"}`
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
    #[serde(default)]
    pub pre_build: Vec<String>,
    #[serde(default)]
    pub post_build: Vec<String>,
}

impl ImageManifest {
    /// Reads the manifest in `dir`, if there is one.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| BuildError::InvalidDefinition {
                path,
                reason: e.to_string(),
            })
    }
}

/// A discovered image definition: its name and the images it is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub name: String,
    pub context_dir: PathBuf,
    pub dockerfile: PathBuf,
    /// Referenced images in first-seen order, without duplicates
    pub dependencies: Vec<String>,
    pub manifest: ImageManifest,
}

impl Image {
    /// Creates an image that is not backed by files, used when the caller
    /// already knows the dependency list.
    pub fn new<I, S>(name: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut image = Self {
            name: name.into(),
            context_dir: PathBuf::from("."),
            dockerfile: PathBuf::from(crate::constants::DEFINITION_FILE_NAME),
            dependencies: Vec::new(),
            manifest: ImageManifest::default(),
        };
        for dep in dependencies {
            image.add_dependency(dep);
        }
        image
    }

    pub fn with_manifest(mut self, manifest: ImageManifest) -> Self {
        if let Some(tag) = &manifest.local_tag {
            self.name = tag.clone();
        }
        self.manifest = manifest;
        self
    }

    /// Indexes a definition file: reads the sibling manifest, parses the
    /// Dockerfile references and validates the result.
    pub fn from_definition(dockerfile: &Path) -> Result<Self> {
        let invalid = |reason: &str| BuildError::InvalidDefinition {
            path: dockerfile.to_path_buf(),
            reason: reason.to_string(),
        };

        let context_dir = dockerfile
            .parent()
            .ok_or_else(|| invalid("definition has no parent directory"))?
            .to_path_buf();
        let manifest = ImageManifest::load(&context_dir)?.unwrap_or_default();

        let name = match &manifest.local_tag {
            Some(tag) => {
                let tag = tag.trim().to_string();
                if tag.is_empty() || tag.chars().any(char::is_whitespace) {
                    return Err(invalid(&format!("invalid local_tag {:?}", tag)));
                }
                tag
            }
            None => name_from_dir(&context_dir),
        };
        if name.is_empty() {
            return Err(invalid("cannot derive an image name from the directory"));
        }

        let content = fs::read_to_string(dockerfile)?;
        let has_from = docker::parse_dockerfile(&content)
            .iter()
            .any(|i| matches!(i, Instruction::From { .. }));
        if !has_from {
            return Err(invalid("no FROM instruction found"));
        }
        // `FROM scratch` alone is valid and leaves no dependencies.
        let dependencies = docker::parse_dependencies(&content);
        if dependencies.iter().any(|d| *d == name) {
            return Err(invalid(&format!("image {} depends on itself", name)));
        }

        tracing::debug!(image = %name, dependencies = ?dependencies, "Indexed image");

        Ok(Self {
            name,
            context_dir,
            dockerfile: dockerfile.to_path_buf(),
            dependencies,
            manifest,
        })
    }

    pub fn add_dependency(&mut self, dep: impl Into<String>) {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
    }

    /// An image is pushed only when both its local and registry tags are known.
    pub fn is_pushable(&self) -> bool {
        self.manifest.local_tag.is_some() && self.manifest.registry_tag.is_some()
    }

    /// Full reference of the image in `registry`, if it is pushable.
    pub fn registry_reference(&self, registry: &str) -> Option<String> {
        let tag = self.manifest.registry_tag.as_deref()?;
        self.manifest.local_tag.as_ref()?;
        Some(format!(
            "{}/{}",
            registry.trim_end_matches('/'),
            tag.trim_start_matches('/')
        ))
    }
}

/// Name of an image without a `local_tag`: its directory path as scanned,
/// without `.` components and with `/` separators.
fn name_from_dir(dir: &Path) -> String {
    let path: PathBuf = dir
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    path.to_string_lossy().replace('\\', "/")
}
