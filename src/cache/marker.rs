//! On-disk staging markers
//!
//! A marker is a file in the install dir recording that an artifact staged
//! successfully. Its content is the newline-delimited list of absolute paths
//! the artifact produced. A marker is only trusted while every listed path
//! still exists; a stale marker is deleted and reported as absent.

use crate::error::{DevstageError, DevstageResult};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Longest marker file name before it is shortened with a hash suffix
const MAX_MARKER_NAME: usize = 200;

/// Replace characters with special meaning on the filesystem by words
pub fn sanitize(name: &str) -> String {
    name.replace('*', "STAR")
        .replace('.', "DOT")
        .replace('/', "SLASH")
}

/// Marker file name for an artifact.
///
/// Filtered bundles fold their member list into the name so different
/// selections from one archive never share a marker.
pub fn marker_name(name: &str, files_to_extract: &[String]) -> String {
    let raw = if files_to_extract.is_empty() {
        format!(".{}", sanitize(name))
    } else {
        let mut parts = vec![format!(".{}", name)];
        parts.extend(files_to_extract.iter().cloned());
        sanitize(&parts.join("_"))
    };

    if raw.len() <= MAX_MARKER_NAME {
        return raw;
    }

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let hash = hex::encode(&hasher.finalize()[..8]);
    let mut cut = MAX_MARKER_NAME - hash.len() - 1;
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{}", &raw[..cut], hash)
}

/// Staging marker for one artifact in one install dir
#[derive(Debug, Clone)]
pub struct Marker {
    path: PathBuf,
    tracks_files: bool,
}

impl Marker {
    /// `tracks_files = false` writes an empty marker, for artifacts whose
    /// output tree is too large to list.
    pub fn new(install_dir: &Path, marker_name: &str, tracks_files: bool) -> Self {
        Self {
            path: install_dir.join(marker_name),
            tracks_files,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Produced files recorded by the marker, or `None` if there is no marker
    pub async fn read(&self) -> DevstageResult<Option<Vec<PathBuf>>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(
                content
                    .lines()
                    .filter(|l| !l.is_empty())
                    .map(PathBuf::from)
                    .collect(),
            )),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DevstageError::io(
                format!("reading marker {}", self.path.display()),
                e,
            )),
        }
    }

    /// True if the marker exists and everything it lists is still on disk.
    ///
    /// Deletes the marker when a listed file has gone missing.
    pub async fn exists(&self) -> DevstageResult<bool> {
        let Some(files) = self.read().await? else {
            return Ok(false);
        };

        if !self.tracks_files {
            return Ok(true);
        }

        for file in &files {
            if !path_exists(file).await {
                info!(
                    "{} is missing, invalidating marker {}",
                    file.display(),
                    self.path.display()
                );
                self.remove().await?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Record a successful stage
    pub async fn write(&self, produced: &[PathBuf]) -> DevstageResult<()> {
        let content = if self.tracks_files {
            produced
                .iter()
                .map(|p| format!("{}\n", p.display()))
                .collect::<String>()
        } else {
            String::new()
        };

        fs::write(&self.path, content).await.map_err(|e| {
            DevstageError::io(format!("writing marker {}", self.path.display()), e)
        })?;
        debug!("Wrote marker {}", self.path.display());
        Ok(())
    }

    pub async fn remove(&self) -> DevstageResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DevstageError::io(
                format!("removing marker {}", self.path.display()),
                e,
            )),
        }
    }
}

/// Existence without following symlinks, so relative links count as present
/// even while their target is not staged.
pub async fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}
