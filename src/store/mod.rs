//! Remote object store access
//!
//! Backends implement the minimal [`RemoteStore`] trait (list, get, cat).
//! [`ObjectStore`] wraps a backend with bounded exponential backoff and the
//! higher-level operations staging needs:
//! - `list_objects`: basenames under a build root matching a pattern
//! - `wait_for_objects`: poll `list_objects` to ride out upload lag
//! - `download_object`: atomic download to a local path

mod gsutil;
mod local;
#[cfg(test)]
pub(crate) mod memory;
mod pattern;
mod retry;

pub use gsutil::GsutilStore;
pub use local::LocalStore;
pub use pattern::NamePattern;
pub use retry::RetryPolicy;

use crate::config::schema::{RemoteBackend, RemoteConfig};
use crate::error::{DevstageError, DevstageResult};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Manifest object listing every file uploaded for a build
pub const UPLOADED_LIST: &str = "UPLOADED";

/// Abstract remote object store
///
/// Paths are full remote paths (`gs://bucket/dir/name`). Implementations
/// return [`DevstageError::RemoteNotFound`] for missing objects and
/// [`DevstageError::RemoteStore`] for failures worth retrying.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List direct children of `dir`; directories carry a trailing `/`
    async fn list(&self, dir: &str) -> DevstageResult<Vec<String>>;

    /// Copy the object at `remote` to `local`
    async fn get(&self, remote: &str, local: &Path) -> DevstageResult<()>;

    /// Read a small text object
    async fn cat(&self, remote: &str) -> DevstageResult<String>;

    /// Get the human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

/// Create the backend selected by the `[remote]` config section
pub fn create_store(config: &RemoteConfig) -> DevstageResult<Arc<dyn RemoteStore>> {
    match config.backend {
        RemoteBackend::Gsutil => Ok(Arc::new(GsutilStore::new(config.gsutil_bin.clone()))),
        RemoteBackend::Local => {
            let root = config
                .local_root
                .clone()
                .ok_or_else(|| DevstageError::ConfigMissing("remote.local_root".to_string()))?;
            Ok(Arc::new(LocalStore::new(root)))
        }
    }
}

/// Retrying object store used by artifact handlers and the build cache
pub struct ObjectStore {
    backend: Arc<dyn RemoteStore>,
    retry: RetryPolicy,
}

impl ObjectStore {
    pub fn new(backend: Arc<dyn RemoteStore>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Build the configured backend with its retry policy
    pub fn from_config(config: &RemoteConfig) -> DevstageResult<Self> {
        Ok(Self::new(
            create_store(config)?,
            RetryPolicy::from_config(config),
        ))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// List children of `dir`, retrying transient failures. A missing
    /// directory lists as empty.
    pub async fn list_dir(&self, dir: &str) -> DevstageResult<Vec<String>> {
        match self
            .retry
            .run("list", || self.backend.list(dir))
            .await
        {
            Ok(entries) => Ok(entries),
            Err(DevstageError::RemoteNotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Read a small text object, retrying transient failures
    pub async fn read_object(&self, remote: &str) -> DevstageResult<String> {
        self.retry.run("cat", || self.backend.cat(remote)).await
    }

    /// Names of uploaded objects under `root` matching `pattern`.
    ///
    /// Consults the build's upload manifest first and falls back to a
    /// directory listing when there is none.
    pub async fn list_objects(
        &self,
        pattern: &NamePattern,
        root: &str,
    ) -> DevstageResult<Vec<String>> {
        let root = root.trim_end_matches('/');
        let manifest = format!("{}/{}", root, UPLOADED_LIST);

        let uploaded: Vec<String> = match self.read_object(&manifest).await {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            Err(DevstageError::RemoteNotFound(_)) => {
                debug!("No {} manifest under {}, listing directory", UPLOADED_LIST, root);
                self.list_dir(root).await?
            }
            Err(e) => return Err(e),
        };

        let mut names: Vec<String> = uploaded
            .iter()
            .filter(|p| !p.ends_with('/'))
            .map(|p| basename(p).to_string())
            .filter(|name| pattern.is_match(name))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Poll `list_objects` until something matches or `timeout` elapses.
    ///
    /// Returns an empty list on timeout; only store failures are errors.
    pub async fn wait_for_objects(
        &self,
        pattern: &NamePattern,
        root: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> DevstageResult<Vec<String>> {
        let deadline = Instant::now() + timeout;

        loop {
            let names = self.list_objects(pattern, root).await?;
            if !names.is_empty() {
                return Ok(names);
            }

            if Instant::now() + poll_interval >= deadline {
                debug!("Gave up waiting for {} under {}", pattern, root);
                return Ok(Vec::new());
            }

            debug!(
                "Nothing matches {} under {} yet, retrying in {:?}",
                pattern, root, poll_interval
            );
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Download `remote` to `local`, retrying transient failures.
    ///
    /// Data lands in a temporary sibling that is renamed into place, so
    /// `local` only ever holds a complete copy.
    pub async fn download_object(&self, remote: &str, local: &Path) -> DevstageResult<()> {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = local.with_file_name(format!(".{}.{}.part", file_name, Uuid::new_v4()));

        let result = self
            .retry
            .run("download", || self.backend.get(remote, &tmp))
            .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        tokio::fs::rename(&tmp, local).await.map_err(|e| {
            DevstageError::io(
                format!("moving {} into place at {}", remote, local.display()),
                e,
            )
        })?;

        debug!("Downloaded {} to {}", remote, local.display());
        Ok(())
    }
}

/// Last path segment of a remote path
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
