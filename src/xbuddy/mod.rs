//! Build cache (xbuddy)
//!
//! Serves images and payloads by xbuddy path (`board/version/alias`),
//! staging whole builds on demand and keeping at most `capacity` of them
//! on disk. Builds are evicted least recently accessed first.
//!
//! ## Eviction
//!
//! After every access the timestamp index is ordered by last access and
//! every build past `capacity` is removed under the build's exclusive lock,
//! so eviction never deletes a directory a stage is writing into. Concurrent
//! accesses may briefly leave the cache over capacity; the next access
//! trims it again.

pub mod local;
pub mod path;
pub mod timestamp;
pub mod version;

pub use path::XbuddyPath;
pub use timestamp::{CacheEntry, TimestampIndex};
pub use version::VersionSpec;

use self::version::RELEASE;
use crate::cache::ErrorStore;
use crate::config::schema::XbuddyConfig;
use crate::error::{DevstageError, DevstageResult};
use crate::staging::Stager;
use crate::store::basename;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// Source of access times
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Build and file an xbuddy path refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedBuild {
    /// `<rel_path>/<version>`, also the build's path under the static dir
    pub build_id: String,
    pub file_name: String,
    /// Registry artifact providing the file; `None` for local builds
    pub artifact: Option<String>,
}

/// LRU cache of staged builds
pub struct BuildCache {
    stager: Arc<Stager>,
    config: XbuddyConfig,
    index: TimestampIndex,
    clock: Clock,
}

impl BuildCache {
    pub fn new(stager: Arc<Stager>, config: XbuddyConfig) -> Self {
        Self {
            index: TimestampIndex::new(stager.static_dir()),
            stager,
            config,
            clock: Arc::new(Utc::now),
        }
    }

    /// Use `clock` for access times instead of the system clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn index(&self) -> &TimestampIndex {
        &self.index
    }

    fn build_dir(&self, build_id: &str) -> PathBuf {
        self.stager.static_dir().join(build_id)
    }

    /// Map an xbuddy path to a build id and file name.
    ///
    /// Remote versions are looked up in the archive; local versions are
    /// linked into the static dir as a side effect.
    pub async fn resolve(&self, path: &str) -> DevstageResult<ResolvedBuild> {
        let parsed = XbuddyPath::parse(path)?;
        let spec = VersionSpec::parse(&parsed.version)?;

        if spec == VersionSpec::Local {
            let file_name = path::local_alias(&parsed.alias)?;
            let images_dir = self
                .config
                .images_dir
                .as_deref()
                .ok_or_else(|| DevstageError::ConfigMissing("xbuddy.images_dir".to_string()))?;
            let version =
                local::link_latest(images_dir, self.stager.static_dir(), &parsed.board, file_name)
                    .await?;

            return Ok(ResolvedBuild {
                build_id: format!("{}/{}", parsed.board, version),
                file_name: file_name.to_string(),
                artifact: None,
            });
        }

        let (file_name, artifact) = path::remote_alias(&parsed.alias)?;
        let build_id = self.resolve_version(&parsed.board, &spec, &parsed.version).await?;
        Ok(ResolvedBuild {
            build_id,
            file_name: file_name.to_string(),
            artifact: Some(artifact.to_string()),
        })
    }

    async fn resolve_version(
        &self,
        board: &str,
        spec: &VersionSpec,
        requested: &str,
    ) -> DevstageResult<String> {
        let release_dir = format!("{}-{}", board, RELEASE);
        let unknown = || DevstageError::VersionUnknown(requested.to_string());

        match spec {
            VersionSpec::Full(full) => Ok(format!("{}/{}", release_dir, full)),
            VersionSpec::LatestOfficial { suffix } => {
                let rel = format!("{}-{}", board, suffix);
                let latest = format!("{}/{}/LATEST-master", self.config.image_archive, rel);
                debug!("Reading {}", latest);
                let found = match self.stager.store().read_object(&latest).await {
                    Ok(content) => content.trim().to_string(),
                    Err(DevstageError::RemoteNotFound(_)) => return Err(unknown()),
                    Err(e) => return Err(e),
                };
                if found.is_empty() {
                    return Err(unknown());
                }
                Ok(format!("{}/{}", rel, found))
            }
            VersionSpec::LatestChannel { channel } => {
                let channel_dir = format!(
                    "{}/{}-channel/{}",
                    self.config.release_archive, channel, board
                );
                let short = self
                    .latest_in(&channel_dir, version::is_short_version)
                    .await?
                    .ok_or_else(unknown)?;

                let suffix = format!("-{}", short);
                let full = self
                    .latest_in(&self.image_dir(&release_dir), |name| {
                        version::is_full_version(name) && name.ends_with(&suffix)
                    })
                    .await?
                    .ok_or_else(unknown)?;
                Ok(format!("{}/{}", release_dir, full))
            }
            VersionSpec::LatestPrefix { prefix } => {
                let full = self
                    .latest_in(&self.image_dir(&release_dir), |name| {
                        version::is_full_version(name) && name.starts_with(prefix.as_str())
                    })
                    .await?
                    .ok_or_else(unknown)?;
                Ok(format!("{}/{}", release_dir, full))
            }
            VersionSpec::Local => Err(unknown()),
        }
    }

    fn image_dir(&self, rel: &str) -> String {
        format!("{}/{}", self.config.image_archive, rel)
    }

    /// Newest subdirectory of `dir` whose name passes `filter`
    async fn latest_in<F>(&self, dir: &str, filter: F) -> DevstageResult<Option<String>>
    where
        F: Fn(&str) -> bool,
    {
        let entries = self.stager.store().list_dir(dir).await?;
        let names: Vec<&str> = entries
            .iter()
            .filter(|entry| entry.ends_with('/'))
            .map(|entry| basename(entry))
            .filter(|name| filter(name))
            .collect();
        Ok(version::latest(names).map(str::to_string))
    }

    /// Local path of the resource behind `path`, staging it if needed.
    ///
    /// With `return_dir` the build directory is returned instead of the file.
    pub async fn get(&self, path: &str, return_dir: bool) -> DevstageResult<PathBuf> {
        let resolved = self.resolve(path).await?;
        let build_dir = self.build_dir(&resolved.build_id);
        let file = build_dir.join(&resolved.file_name);

        if let Some(artifact) = &resolved.artifact {
            if fs::symlink_metadata(&file).await.is_ok() {
                debug!("{} is already cached", file.display());
            } else {
                let archive_url = self.image_dir(&resolved.build_id);
                let location = self.stager.location(&archive_url);
                info!("Staging {} from {}", artifact, archive_url);
                self.stager
                    .stage(&location, &[artifact.clone()], &[], false)
                    .await?;
            }
        }

        self.record_access(&resolved.build_id).await?;
        Ok(if return_dir { build_dir } else { file })
    }

    /// Mark `build_id` as just accessed and trim the cache.
    ///
    /// Returns the evicted build ids.
    pub async fn record_access(&self, build_id: &str) -> DevstageResult<Vec<String>> {
        self.index.touch(build_id, (self.clock)()).await?;
        self.clean_cache().await
    }

    /// Cached builds, most recently accessed first
    pub async fn list(&self) -> DevstageResult<Vec<CacheEntry>> {
        self.sync_local_builds().await?;
        self.index.entries().await
    }

    async fn sync_local_builds(&self) -> DevstageResult<()> {
        match &self.config.images_dir {
            Some(images_dir) => {
                local::sync_local_builds(
                    images_dir,
                    self.stager.static_dir(),
                    &self.index,
                    self.config.manage_builds,
                    (self.clock)(),
                )
                .await
            }
            None => Ok(()),
        }
    }

    /// Evict everything past capacity, least recently accessed first.
    ///
    /// Returns the evicted build ids. A build that cannot be removed is
    /// logged and skipped.
    pub async fn clean_cache(&self) -> DevstageResult<Vec<String>> {
        self.sync_local_builds().await?;
        let entries = self.index.entries().await?;
        debug!(
            "In cache now: {:?}",
            entries.iter().map(|e| e.build_id.as_str()).collect::<Vec<_>>()
        );

        let mut evicted = Vec::new();
        for entry in entries.iter().skip(self.config.capacity) {
            match self.evict(&entry.build_id).await {
                Ok(()) => evicted.push(entry.build_id.clone()),
                Err(e) => warn!("Failed to clear {} from the cache: {}", entry.build_id, e),
            }
        }
        Ok(evicted)
    }

    async fn evict(&self, build_id: &str) -> DevstageResult<()> {
        let build_dir = self.build_dir(build_id);
        let _exclusive = self.stager.locks().build_exclusive(&build_dir).await;
        info!("Clearing {} from the cache", build_id);

        self.index.remove(build_id).await?;
        ErrorStore::for_build(&build_dir).remove_all().await?;

        let meta = match fs::symlink_metadata(&build_dir).await {
            Ok(meta) => meta,
            Err(_) => return Ok(()),
        };

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&build_dir).await.ok();
            remove(&build_dir, false).await?;
            if self.config.manage_builds {
                if let Some(target) = target {
                    info!("Deleting locally built image at {}", target.display());
                    remove(&target, true).await?;
                }
            }
        } else {
            debug!("Deleting downloaded image at {}", build_dir.display());
            remove(&build_dir, meta.is_dir()).await?;
        }
        Ok(())
    }
}

async fn remove(path: &Path, is_dir: bool) -> DevstageResult<()> {
    let result = if is_dir {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DevstageError::io(format!("removing {}", path.display()), e)),
    }
}
