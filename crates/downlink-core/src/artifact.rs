//! Artifact descriptors and the ordered catalog a run consumes.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CatalogError;
use crate::protocol::MAX_ARTIFACT_SIZE;

/// What kind of data an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactCategory {
    ScienceImage,
    IndexMetadata,
}

impl fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScienceImage => f.write_str("science-image"),
            Self::IndexMetadata => f.write_str("index-metadata"),
        }
    }
}

/// One artifact to downlink. Immutable once the catalog is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub path: PathBuf,
    /// Configured size in bytes. The transfer buffer is sized from this, not
    /// from a live stat of the file.
    pub expected_size: u64,
    pub category: ArtifactCategory,
}

impl ArtifactDescriptor {
    pub fn new(path: impl Into<PathBuf>, expected_size: u64, category: ArtifactCategory) -> Self {
        Self {
            path: path.into(),
            expected_size,
            category,
        }
    }
}

/// Whether expected sizes are checked against the filesystem when the
/// catalog is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SizePolicy {
    /// Use the configured size as-is.
    #[default]
    Trust,
    /// Stat every artifact and warn on mismatch. The configured size still
    /// drives the chunk plan.
    Verify,
}

/// Validated, ordered sequence of artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<ArtifactDescriptor>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Parse a JSON array of descriptors.
    pub fn from_json(json: &str, policy: SizePolicy) -> Result<Self, CatalogError> {
        let entries: Vec<ArtifactDescriptor> = serde_json::from_str(json)?;
        CatalogBuilder { entries, policy }.build()
    }

    /// Read and parse a JSON catalog file.
    pub fn from_json_file(path: &Path, policy: SizePolicy) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json, policy)
    }

    /// Each science image followed by the shared index metadata file.
    pub fn interleaved(
        images: &[PathBuf],
        image_size: u64,
        index: &Path,
        index_size: u64,
        policy: SizePolicy,
    ) -> Result<Self, CatalogError> {
        let mut builder = Self::builder().size_policy(policy);
        for image in images {
            builder = builder
                .science_image(image, image_size)
                .index_metadata(index, index_size);
        }
        builder.build()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ArtifactDescriptor> {
        self.entries.iter()
    }

    /// Sum of expected sizes.
    pub fn total_expected(&self) -> u64 {
        self.entries.iter().map(|a| a.expected_size).sum()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a ArtifactDescriptor;
    type IntoIter = std::slice::Iter<'a, ArtifactDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entries: Vec<ArtifactDescriptor>,
    policy: SizePolicy,
}

impl CatalogBuilder {
    pub fn artifact(mut self, descriptor: ArtifactDescriptor) -> Self {
        self.entries.push(descriptor);
        self
    }

    pub fn science_image(self, path: impl Into<PathBuf>, expected_size: u64) -> Self {
        self.artifact(ArtifactDescriptor::new(
            path,
            expected_size,
            ArtifactCategory::ScienceImage,
        ))
    }

    pub fn index_metadata(self, path: impl Into<PathBuf>, expected_size: u64) -> Self {
        self.artifact(ArtifactDescriptor::new(
            path,
            expected_size,
            ArtifactCategory::IndexMetadata,
        ))
    }

    pub fn size_policy(mut self, policy: SizePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<Catalog, CatalogError> {
        if self.entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.path.as_os_str().is_empty() {
                return Err(CatalogError::EmptyPath { index });
            }
            if entry.expected_size == 0 {
                return Err(CatalogError::ZeroSize {
                    index,
                    path: entry.path.clone(),
                });
            }
            if entry.expected_size > MAX_ARTIFACT_SIZE {
                return Err(CatalogError::TooLarge {
                    index,
                    path: entry.path.clone(),
                    size: entry.expected_size,
                    max: MAX_ARTIFACT_SIZE,
                });
            }
            if self.policy == SizePolicy::Verify {
                verify_size(entry);
            }
        }
        Ok(Catalog {
            entries: self.entries,
        })
    }
}

fn verify_size(entry: &ArtifactDescriptor) {
    match std::fs::metadata(&entry.path) {
        Ok(meta) if meta.len() != entry.expected_size => {
            warn!(
                path = %entry.path.display(),
                expected = entry.expected_size,
                actual = meta.len(),
                "Artifact size differs from catalog"
            );
        }
        Ok(_) => {}
        Err(e) => {
            warn!(path = %entry.path.display(), "Cannot stat artifact: {}", e);
        }
    }
}
