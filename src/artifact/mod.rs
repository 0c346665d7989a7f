//! Artifact handlers
//!
//! Each registry entry or raw file name is bound to an [`ArtifactHandler`]
//! for one build. Handlers only know how to produce their files; locking,
//! marker checks and error normalization live in [`process`] so every
//! variant gets them identically:
//!
//! - [`PlainArtifact`]: resolve one object name, download it
//! - [`BundleArtifact`]: plain download plus zip or tar extraction
//! - [`DeltaArtifact`]: composite of payload sub-artifacts wired to the
//!   shared stateful file
//! - [`RenamedArtifact`]: wrapper moving the primary file to a canonical name

mod archive;
mod bundle;
mod delta;
pub mod names;
mod plain;
pub mod registry;
mod rename;

pub use archive::{compression_program, select_zip_members};
pub use bundle::{ArchiveFormat, BundleArtifact};
pub use delta::DeltaArtifact;
pub use plain::PlainArtifact;
pub use registry::{optional_artifacts, ArtifactFactory, ArtifactSpec, HandlerKind};
pub use rename::RenamedArtifact;

use crate::cache::{LockRegistry, Marker};
use crate::error::{ArtifactErrorKind, DevstageError, DevstageResult};
use crate::store::ObjectStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Shared collaborators and wait windows for one staging attempt
#[derive(Clone)]
pub struct StageContext {
    pub store: Arc<ObjectStore>,
    pub locks: Arc<LockRegistry>,
    /// How long to wait for an object to appear in the archive
    pub timeout: Duration,
    /// Window used where the object should already be uploaded
    pub short_timeout: Duration,
    pub poll_interval: Duration,
}

impl StageContext {
    /// Same collaborators, waiting only the short window
    pub fn no_wait(&self) -> Self {
        Self {
            timeout: self.short_timeout,
            ..self.clone()
        }
    }
}

/// Staging logic for one artifact of one build
#[async_trait]
pub trait ArtifactHandler: Send + Sync {
    /// Registry or file name, used in errors and error records
    fn name(&self) -> &str;

    /// Directory the artifact is staged into
    fn install_dir(&self) -> &Path;

    /// Lock key within the install dir; artifacts sharing a remote object
    /// share a key
    fn lock_key(&self) -> &str;

    /// Marker recording a successful stage
    fn marker(&self) -> Marker;

    /// Download and transform, returning every produced path.
    ///
    /// Called with the artifact lock held and no valid marker present.
    async fn stage(&self, ctx: &StageContext) -> DevstageResult<Vec<PathBuf>>;
}

/// Result of a successful [`process`]
#[derive(Debug, Clone, PartialEq)]
pub struct StagedArtifact {
    pub name: String,
    pub install_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub marker: PathBuf,
    /// False if a valid marker was already present
    pub fresh: bool,
}

/// Stage `handler` unless a valid marker says it already is.
///
/// Concurrent calls for the same key serialize on the artifact lock; the
/// later caller finds the marker and returns without downloading.
pub async fn process(
    handler: &dyn ArtifactHandler,
    ctx: &StageContext,
) -> DevstageResult<StagedArtifact> {
    let install_dir = handler.install_dir();
    let _guard = ctx.locks.artifact(install_dir, handler.lock_key()).await;

    fs::create_dir_all(install_dir).await.map_err(|e| {
        DevstageError::io(format!("creating directory {}", install_dir.display()), e)
    })?;

    let marker = handler.marker();
    if marker.exists().await? {
        info!("{} is already staged in {}", handler.name(), install_dir.display());
        return Ok(StagedArtifact {
            name: handler.name().to_string(),
            install_dir: install_dir.to_path_buf(),
            files: marker.read().await?.unwrap_or_default(),
            marker: marker.path().to_path_buf(),
            fresh: false,
        });
    }

    debug!("Staging {} into {}", handler.name(), install_dir.display());
    let files = handler
        .stage(ctx)
        .await
        .map_err(|e| into_artifact_error(handler.name(), e))?;
    marker.write(&files).await?;

    info!("Staged {} ({} files)", handler.name(), files.len());
    Ok(StagedArtifact {
        name: handler.name().to_string(),
        install_dir: install_dir.to_path_buf(),
        files,
        marker: marker.path().to_path_buf(),
        fresh: true,
    })
}

/// Normalize store failures that escaped a handler into artifact errors
pub fn into_artifact_error(artifact: &str, err: DevstageError) -> DevstageError {
    match err {
        DevstageError::RemoteStore { .. } => {
            DevstageError::artifact(artifact, ArtifactErrorKind::Transient, err.to_string())
        }
        DevstageError::RemoteNotFound(path) => DevstageError::artifact(
            artifact,
            ArtifactErrorKind::NotFound,
            format!("{} is no longer in the archive", path),
        ),
        other => other,
    }
}

/// Join an archive URL and an object name
pub(crate) fn remote_path(archive_url: &str, name: &str) -> String {
    format!("{}/{}", archive_url.trim_end_matches('/'), name)
}
