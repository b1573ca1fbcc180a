//! Generated outputs and the path conventions that let them cross processes.
//!
//! Every artifact is referenced as `"<output-dir-name>/<filename>"`. A process
//! turns that reference into a real path by joining it onto its own image
//! root, so the two stages may run with different absolute roots.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use crate::error::{PipelineError, Result};
use crate::model_types::ArtifactKind;

/// Portable pointer to a generated file, relative to an image root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(dir: &str, file: &str) -> Self {
        if dir.is_empty() {
            Self(file.to_string())
        } else {
            Self(format!("{dir}/{file}"))
        }
    }

    /// Re-derive `parent-dir-name/filename` from any absolute or relative form.
    /// Returns `None` when the path has no file name.
    pub fn from_path_like(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let file = path.file_name()?.to_str()?;
        let dir = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|d| d.to_str())
            .unwrap_or("");

        Some(Self::new(dir, file))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file written by one of the stages
#[derive(Debug, Clone, PartialEq)]
pub struct ResultArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub reference: ArtifactRef,
    pub created_at: DateTime<Utc>,
}

/// Where both stages keep their inputs and outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    /// Shared root all artifact references are relative to
    pub image_root: PathBuf,
    pub swap_dir: String,
    pub reconstruction_dir: String,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            image_root: PathBuf::from("../imgs"),
            swap_dir: "3d_targets".to_string(),
            reconstruction_dir: "3d_outputs".to_string(),
        }
    }
}

impl StorageLayout {
    pub fn new(image_root: impl Into<PathBuf>) -> Self {
        Self {
            image_root: image_root.into(),
            ..Self::default()
        }
    }

    pub fn swap_store(&self) -> ArtifactStore {
        ArtifactStore::new(self.image_root.join(&self.swap_dir))
    }

    pub fn reconstruction_store(&self) -> ArtifactStore {
        ArtifactStore::new(self.image_root.join(&self.reconstruction_dir))
    }

    /// Path of an artifact reference under this process's image root
    pub fn locate(&self, reference: &ArtifactRef) -> PathBuf {
        self.image_root.join(reference.as_str())
    }

    /// Resolve a source path sent by another process: the path as given if it
    /// names a file, otherwise the same path under the image root.
    pub fn resolve_source(&self, source: &str) -> Option<PathBuf> {
        let verbatim = Path::new(source);
        if verbatim.is_file() {
            return Some(verbatim.to_path_buf());
        }

        let rooted = self.image_root.join(verbatim);
        debug!(source, fallback = %rooted.display(), "Source not found verbatim, trying image root");
        rooted.is_file().then_some(rooted)
    }
}

/// Writes artifacts into one output directory without ever exposing a
/// partially written file under its final name.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write through `write` into a hidden temporary file, then rename it into
    /// place. The temporary keeps the artifact's extension so writers can
    /// infer the format from it.
    pub fn persist_with<F>(&self, kind: ArtifactKind, stem: &str, write: F) -> Result<ResultArtifact>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        fs::create_dir_all(&self.dir)?;

        let created_at = Utc::now();
        let name = unique_name(stem, kind, created_at);
        let partial = self.dir.join(format!(".{name}.partial.{}", kind.extension()));
        let path = self.dir.join(&name);

        if let Err(e) = write(&partial) {
            if let Err(cleanup) = fs::remove_file(&partial) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %partial.display(), error = %cleanup, "Could not remove partial artifact");
                }
            }
            return Err(e);
        }

        fs::rename(&partial, &path)?;

        let reference = ArtifactRef::from_path_like(&path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("artifact path has no file name: {}", path.display()))
        })?;

        debug!(%reference, path = %path.display(), "Artifact persisted");

        Ok(ResultArtifact {
            kind,
            path,
            reference,
            created_at,
        })
    }

    pub fn persist_image(&self, stem: &str, image: &RgbImage) -> Result<ResultArtifact> {
        self.persist_with(ArtifactKind::Image, stem, |path| {
            image
                .save_with_format(path, ImageFormat::Png)
                .map_err(|e| PipelineError::Storage(io::Error::other(e)))
        })
    }

    pub fn persist_bytes(&self, kind: ArtifactKind, stem: &str, bytes: &[u8]) -> Result<ResultArtifact> {
        self.persist_with(kind, stem, |path| Ok(fs::write(path, bytes)?))
    }
}

/// `<stem>_<YYYYmmddHHMMSS>_<8 hex>.<ext>`
fn unique_name(stem: &str, kind: ArtifactKind, at: DateTime<Utc>) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{stem}_{}_{}.{}", at.format("%Y%m%d%H%M%S"), &nonce[..8], kind.extension())
}
