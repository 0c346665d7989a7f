//! Bundled artifacts: a downloaded archive extracted in place

use crate::artifact::archive::{extract_tar, extract_zip};
use crate::artifact::names::AUTOTEST_DIR;
use crate::artifact::{ArtifactHandler, PlainArtifact, StageContext};
use crate::cache::{marker_name, path_exists, Marker};
use crate::error::{ArtifactErrorKind, DevstageError, DevstageResult};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

/// Checksum file shipped by autotest tarballs with pre-built packages
const PACKAGES_CHECKSUM: &str = "packages.checksum";

/// Archive flavour of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zip => write!(f, "zip"),
            Self::Tar => write!(f, "tar"),
        }
    }
}

/// Downloads an archive and extracts all or some of its members
pub struct BundleArtifact {
    archive: PlainArtifact,
    format: ArchiveFormat,
    files_to_extract: Vec<String>,
    exclude: Vec<String>,
    autotest_packages: bool,
}

impl BundleArtifact {
    pub fn new(archive: PlainArtifact, format: ArchiveFormat) -> Self {
        Self {
            archive,
            format,
            files_to_extract: Vec::new(),
            exclude: Vec::new(),
            autotest_packages: false,
        }
    }

    /// Extract only these members
    pub fn extracting(mut self, files: Vec<String>) -> Self {
        self.files_to_extract = files;
        self
    }

    /// Skip these members
    pub fn excluding(mut self, files: Vec<String>) -> Self {
        self.exclude = files;
        self
    }

    /// Build the autotest package repository after extraction
    pub fn with_autotest_packages(mut self) -> Self {
        self.autotest_packages = true;
        self
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }
}

#[async_trait]
impl ArtifactHandler for BundleArtifact {
    fn name(&self) -> &str {
        self.archive.name()
    }

    fn install_dir(&self) -> &Path {
        self.archive.install_dir()
    }

    fn lock_key(&self) -> &str {
        self.archive.lock_key()
    }

    fn marker(&self) -> Marker {
        Marker::new(
            self.install_dir(),
            &marker_name(self.name(), &self.files_to_extract),
            self.archive.tracks_files(),
        )
    }

    async fn stage(&self, ctx: &StageContext) -> DevstageResult<Vec<PathBuf>> {
        let fetched = self.archive.fetch(ctx).await?;
        let archive_path = fetched.into_iter().next().ok_or_else(|| {
            DevstageError::Internal(format!("{} resolved to no archive", self.name()))
        })?;

        let extracted = match self.format {
            ArchiveFormat::Zip => {
                extract_zip(
                    self.name(),
                    &archive_path,
                    self.install_dir(),
                    &self.files_to_extract,
                    &self.exclude,
                )
                .await?
            }
            ArchiveFormat::Tar => {
                extract_tar(
                    self.name(),
                    &archive_path,
                    self.install_dir(),
                    &self.files_to_extract,
                    &self.exclude,
                )
                .await?
            }
        };

        if self.autotest_packages {
            package_autotest(self.name(), self.install_dir()).await?;
        }

        let mut produced = Vec::with_capacity(extracted.len() + 1);
        produced.push(archive_path);
        produced.extend(extracted);
        Ok(produced)
    }
}

/// Ensure `autotest/packages` exists and holds a package repository.
///
/// Tarballs that ship `packages.checksum` already carry the packages;
/// older ones get them from `autotest/utils/packager.py`, run from the
/// install dir.
async fn package_autotest(artifact: &str, install_dir: &Path) -> DevstageResult<()> {
    let packages = install_dir.join(AUTOTEST_DIR).join("packages");
    fs::create_dir_all(&packages)
        .await
        .map_err(|e| DevstageError::io(format!("creating {}", packages.display()), e))?;

    if path_exists(&packages.join(PACKAGES_CHECKSUM)).await {
        debug!("Using pre-generated autotest packages in {}", packages.display());
        return Ok(());
    }

    let packager = install_dir.join(AUTOTEST_DIR).join("utils/packager.py");
    info!("Creating autotest packages in {}", packages.display());
    let output = Command::new(&packager)
        .arg("upload")
        .arg("--repository")
        .arg(&packages)
        .arg("--all")
        .current_dir(install_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            DevstageError::artifact(
                artifact,
                ArtifactErrorKind::Extraction,
                format!("Failed to create autotest packages: {}: {}", packager.display(), e),
            )
        })?;

    if !output.status.success() {
        return Err(DevstageError::artifact(
            artifact,
            ArtifactErrorKind::Extraction,
            format!(
                "Failed to create autotest packages: packager exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    Ok(())
}
