//! Remote store backed by a local directory tree
//!
//! `gs://bucket/some/path` is served from `{root}/bucket/some/path`; plain
//! absolute paths are served as-is. Used for archives mirrored to disk.

use crate::error::{DevstageError, DevstageResult};
use crate::store::RemoteStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Remote store reading from the local filesystem
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a remote path onto the filesystem
    pub fn resolve(&self, remote: &str) -> PathBuf {
        match remote.split_once("://") {
            Some((_, rest)) => self.root.join(rest.trim_start_matches('/')),
            None if Path::new(remote).is_absolute() => PathBuf::from(remote),
            None => self.root.join(remote),
        }
    }

    fn map_err(remote: &str, operation: &str, e: std::io::Error) -> DevstageError {
        if e.kind() == ErrorKind::NotFound {
            DevstageError::RemoteNotFound(remote.to_string())
        } else {
            DevstageError::remote(format!("{} {}", operation, remote), e.to_string())
        }
    }
}

#[async_trait]
impl RemoteStore for LocalStore {
    async fn list(&self, dir: &str) -> DevstageResult<Vec<String>> {
        let dir = dir.trim_end_matches('/');
        let path = self.resolve(dir);
        let mut entries = fs::read_dir(&path)
            .await
            .map_err(|e| Self::map_err(dir, "ls", e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::map_err(dir, "ls", e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let suffix = if is_dir { "/" } else { "" };
            names.push(format!("{}/{}{}", dir, name, suffix));
        }

        names.sort();
        Ok(names)
    }

    async fn get(&self, remote: &str, local: &Path) -> DevstageResult<()> {
        fs::copy(self.resolve(remote), local)
            .await
            .map_err(|e| Self::map_err(remote, "cp", e))?;
        Ok(())
    }

    async fn cat(&self, remote: &str) -> DevstageResult<String> {
        fs::read_to_string(self.resolve(remote))
            .await
            .map_err(|e| Self::map_err(remote, "cat", e))
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
