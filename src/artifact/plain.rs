//! Plain artifacts: one object downloaded as-is

use crate::artifact::{remote_path, ArtifactHandler, StageContext};
use crate::cache::{marker_name, Marker};
use crate::error::{ArtifactErrorKind, DevstageError, DevstageResult};
use crate::store::NamePattern;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Downloads the object(s) matching a name pattern into the install dir
pub struct PlainArtifact {
    name: String,
    install_dir: PathBuf,
    archive_url: String,
    pattern: NamePattern,
    single_match: bool,
    tracks_files: bool,
}

impl PlainArtifact {
    pub fn new(
        name: impl Into<String>,
        install_dir: impl Into<PathBuf>,
        archive_url: impl Into<String>,
        pattern: NamePattern,
    ) -> Self {
        Self {
            name: name.into(),
            install_dir: install_dir.into(),
            archive_url: archive_url.into(),
            pattern,
            single_match: true,
            tracks_files: true,
        }
    }

    /// Download every match instead of requiring exactly one
    pub fn allow_multiple(mut self) -> Self {
        self.single_match = false;
        self
    }

    /// Write an empty marker instead of listing produced files
    pub fn untracked(mut self) -> Self {
        self.tracks_files = false;
        self
    }

    pub fn pattern(&self) -> &NamePattern {
        &self.pattern
    }

    pub fn tracks_files(&self) -> bool {
        self.tracks_files
    }

    /// Wait for the pattern to match and check the match count
    pub async fn resolve(&self, ctx: &StageContext) -> DevstageResult<Vec<String>> {
        let names = ctx
            .store
            .wait_for_objects(&self.pattern, &self.archive_url, ctx.timeout, ctx.poll_interval)
            .await?;

        if names.is_empty() {
            return Err(DevstageError::artifact(
                &self.name,
                ArtifactErrorKind::NotFound,
                format!("nothing matches {} in {}", self.pattern, self.archive_url),
            ));
        }

        if self.single_match && names.len() > 1 {
            return Err(DevstageError::artifact(
                &self.name,
                ArtifactErrorKind::Ambiguous,
                format!(
                    "{} objects match {}: {}",
                    names.len(),
                    self.pattern,
                    names.join(", ")
                ),
            ));
        }

        Ok(names)
    }

    /// Resolve and download, returning the local paths
    pub async fn fetch(&self, ctx: &StageContext) -> DevstageResult<Vec<PathBuf>> {
        let names = self.resolve(ctx).await?;
        let mut paths = Vec::with_capacity(names.len());

        for name in names {
            let local = self.install_dir.join(&name);
            debug!("Fetching {} for {}", name, self.name);
            ctx.store
                .download_object(&remote_path(&self.archive_url, &name), &local)
                .await?;
            paths.push(local);
        }

        Ok(paths)
    }
}

#[async_trait]
impl ArtifactHandler for PlainArtifact {
    fn name(&self) -> &str {
        &self.name
    }

    fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// The downloaded object, so selections of one archive serialize
    fn lock_key(&self) -> &str {
        self.pattern.as_str()
    }

    fn marker(&self) -> Marker {
        Marker::new(
            &self.install_dir,
            &marker_name(&self.name, &[]),
            self.tracks_files,
        )
    }

    async fn stage(&self, ctx: &StageContext) -> DevstageResult<Vec<PathBuf>> {
        self.fetch(ctx).await
    }
}
