//! Renaming wrapper around any handler

use crate::artifact::{ArtifactHandler, StageContext};
use crate::cache::Marker;
use crate::error::{DevstageError, DevstageResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Stages the inner handler, then moves its primary file to `new_name`
pub struct RenamedArtifact {
    inner: Box<dyn ArtifactHandler>,
    new_name: String,
}

impl RenamedArtifact {
    pub fn new(inner: Box<dyn ArtifactHandler>, new_name: impl Into<String>) -> Self {
        Self {
            inner,
            new_name: new_name.into(),
        }
    }
}

#[async_trait]
impl ArtifactHandler for RenamedArtifact {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn install_dir(&self) -> &Path {
        self.inner.install_dir()
    }

    fn lock_key(&self) -> &str {
        self.inner.lock_key()
    }

    fn marker(&self) -> Marker {
        self.inner.marker()
    }

    async fn stage(&self, ctx: &StageContext) -> DevstageResult<Vec<PathBuf>> {
        let mut files = self.inner.stage(ctx).await?;
        let Some(primary) = files.first_mut() else {
            return Err(DevstageError::Internal(format!(
                "{} produced nothing to rename",
                self.name()
            )));
        };

        let target = self.inner.install_dir().join(&self.new_name);
        if *primary != target {
            fs::rename(&*primary, &target).await.map_err(|e| {
                DevstageError::io(
                    format!("renaming {} to {}", primary.display(), target.display()),
                    e,
                )
            })?;
            debug!("Renamed {} to {}", primary.display(), target.display());
            *primary = target;
        }

        Ok(files)
    }
}
