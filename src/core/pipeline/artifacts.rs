#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Destination for per-step snapshots, logs and images.
pub trait ArtifactStore: Send + Sync {
    /// Directory every relative path is resolved against.
    fn root(&self) -> &Path;

    /// Write `data` to `relative`, creating parent directories. Returns the full path.
    fn write(&self, relative: &str, data: &[u8]) -> Result<PathBuf, AppError>;
}

/// Artifact store backed by one output directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the output directory, removing whatever a previous run left there.
    pub fn prepare(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let store = Self::new(root);
        if store.root.exists() {
            fs::remove_dir_all(&store.root).map_err(|err| {
                AppError::new(
                    ErrorCategory::IoError,
                    format!("failed to clear {}: {}", store.root.display(), err),
                )
            })?;
            tracing::debug!(root = %store.root.display(), "removed previous output");
        }
        fs::create_dir_all(&store.root).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to create {}: {}", store.root.display(), err),
            )
        })?;
        Ok(store)
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, AppError> {
        let path = Path::new(relative);
        let escapes = relative.is_empty()
            || path.components().any(|component| {
                !matches!(component, Component::Normal(_) | Component::CurDir)
            });
        if escapes {
            return Err(AppError::new(
                ErrorCategory::ArtifactError,
                format!("artifact path escapes output directory: {}", relative),
            )
            .with_code("AMP-ART-001"));
        }
        Ok(self.root.join(path))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn write(&self, relative: &str, data: &[u8]) -> Result<PathBuf, AppError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::new(
                    ErrorCategory::IoError,
                    format!("failed to create {}: {}", parent.display(), err),
                )
            })?;
        }
        fs::write(&path, data).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to write {}: {}", path.display(), err),
            )
        })?;
        Ok(path)
    }
}
