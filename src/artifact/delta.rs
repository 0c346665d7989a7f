//! Composite delta payload artifact
//!
//! A build may carry an N-to-N delta (from itself) and M-to-N deltas (from
//! other builds). Each kind stages into its own directory under `au/` as
//! `update.gz`, next to a relative link to the build's stateful payload.
//! Either kind may be missing; only losing both fails the artifact.

use crate::artifact::names::{AU_DIR, MTON_SUFFIX, NTON_SUFFIX, STATEFUL_FILE, UPDATE_FILE};
use crate::artifact::{process, ArtifactHandler, PlainArtifact, RenamedArtifact, StageContext};
use crate::cache::{marker_name, path_exists, Marker};
use crate::error::{ArtifactErrorKind, DevstageError, DevstageResult};
use crate::store::NamePattern;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Delta payloads staged through their own sub-artifacts
pub struct DeltaArtifact {
    name: String,
    install_dir: PathBuf,
    archive_url: String,
    pattern: NamePattern,
    parts: Vec<RenamedArtifact>,
}

impl DeltaArtifact {
    /// `pattern` is the regex every delta payload name matches
    pub fn new(
        name: impl Into<String>,
        install_dir: impl Into<PathBuf>,
        archive_url: impl Into<String>,
        build: &str,
        pattern: &str,
    ) -> DevstageResult<Self> {
        let name = name.into();
        let install_dir = install_dir.into();
        let archive_url = archive_url.into();
        let au_dir = install_dir.join(AU_DIR);
        let build_prefix = format!("^chromeos_{}", regex::escape(build));

        let mton = NamePattern::regex(&format!("^chromeos_{}", pattern))?
            .rejecting(&build_prefix)?;
        let nton = NamePattern::regex(&format!("{}{}", build_prefix, pattern))?;

        let part = |suffix: &str, pattern: NamePattern| {
            let plain = PlainArtifact::new(
                format!("{}{}", name, suffix),
                au_dir.join(format!("{}{}", build, suffix)),
                archive_url.clone(),
                pattern,
            );
            RenamedArtifact::new(Box::new(plain), UPDATE_FILE)
        };
        let parts = vec![part(MTON_SUFFIX, mton), part(NTON_SUFFIX, nton)];

        Ok(Self {
            pattern: NamePattern::regex(pattern)?,
            name,
            install_dir,
            archive_url,
            parts,
        })
    }

    /// Point `<part dir>/stateful.tgz` at the build's stateful payload
    async fn link_stateful(part_dir: &Path) -> DevstageResult<PathBuf> {
        let link = part_dir.join(STATEFUL_FILE);
        if path_exists(&link).await {
            fs::remove_file(&link).await.map_err(|e| {
                DevstageError::io(format!("removing stale link {}", link.display()), e)
            })?;
        }

        let target = Path::new("..").join("..").join(STATEFUL_FILE);
        symlink(&target, &link).await.map_err(|e| {
            DevstageError::io(format!("linking {} to {}", link.display(), target.display()), e)
        })?;
        debug!("Linked {} -> {}", link.display(), target.display());
        Ok(link)
    }
}

#[cfg(unix)]
async fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    fs::symlink(target, link).await
}

#[cfg(windows)]
async fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    fs::symlink_file(target, link).await
}

#[async_trait]
impl ArtifactHandler for DeltaArtifact {
    fn name(&self) -> &str {
        &self.name
    }

    fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    fn lock_key(&self) -> &str {
        self.pattern.as_str()
    }

    fn marker(&self) -> Marker {
        Marker::new(
            &self.install_dir,
            &marker_name(&self.name, &[]),
            true,
        )
    }

    async fn stage(&self, ctx: &StageContext) -> DevstageResult<Vec<PathBuf>> {
        let available = ctx
            .store
            .wait_for_objects(&self.pattern, &self.archive_url, ctx.timeout, ctx.poll_interval)
            .await?;
        if available.is_empty() {
            return Err(DevstageError::artifact(
                &self.name,
                ArtifactErrorKind::NotFound,
                format!("no delta payloads in {}", self.archive_url),
            ));
        }

        // Everything is uploaded by now; parts only take the short window
        let part_ctx = ctx.no_wait();
        let mut produced = Vec::new();
        let mut failures = Vec::new();

        for part in &self.parts {
            match process(part, &part_ctx).await {
                Ok(staged) => {
                    produced.extend(staged.files);
                    produced.push(Self::link_stateful(part.install_dir()).await?);
                }
                Err(e) => {
                    warn!("Could not stage {}: {}", part.name(), e);
                    failures.push(e);
                }
            }
        }

        if produced.is_empty() {
            let kind = failures
                .first()
                .and_then(DevstageError::artifact_kind)
                .unwrap_or(ArtifactErrorKind::NotFound);
            let reasons: Vec<String> = failures.iter().map(|e| e.to_string()).collect();
            return Err(DevstageError::artifact(&self.name, kind, reasons.join("; ")));
        }

        Ok(produced)
    }
}
