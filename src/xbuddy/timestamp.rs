//! Last-access index of cached builds
//!
//! One file per build under `<static_dir>/xbuddy_UpdateTimestamps`, named
//! after the build id with `/` spelled `SLASH`. The file holds the RFC 3339
//! time of the last access; files written by other tools without content
//! fall back to their modification time.
//!
//! The encoding is not injective: a build id containing `SLASH` itself would
//! read back with a `/` in its place, so such ids are refused.

use crate::error::{DevstageError, DevstageResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub const TIMESTAMP_DIR: &str = "xbuddy_UpdateTimestamps";
const DELIMITER: &str = "SLASH";

/// One cached build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub build_id: String,
    pub last_access: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TimestampIndex {
    dir: PathBuf,
}

impl TimestampIndex {
    pub fn new(static_dir: &Path) -> Self {
        Self {
            dir: static_dir.join(TIMESTAMP_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// False for ids whose file name would not decode back to them
    pub fn accepts(build_id: &str) -> bool {
        !build_id.contains(DELIMITER)
    }

    fn path(&self, build_id: &str) -> PathBuf {
        self.dir.join(build_id.replace('/', DELIMITER))
    }

    /// Record an access to `build_id` at `at`
    pub async fn touch(&self, build_id: &str, at: DateTime<Utc>) -> DevstageResult<()> {
        if !Self::accepts(build_id) {
            return Err(DevstageError::PathSpecInvalid(format!(
                "build id {} contains the reserved word {}",
                build_id, DELIMITER
            )));
        }
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            DevstageError::io(format!("creating directory {}", self.dir.display()), e)
        })?;

        let path = self.path(build_id);
        fs::write(&path, at.to_rfc3339())
            .await
            .map_err(|e| DevstageError::io(format!("writing {}", path.display()), e))?;
        debug!("Touched {} at {}", build_id, at);
        Ok(())
    }

    pub async fn contains(&self, build_id: &str) -> bool {
        fs::metadata(self.path(build_id)).await.is_ok()
    }

    pub async fn remove(&self, build_id: &str) -> DevstageResult<()> {
        let path = self.path(build_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DevstageError::io(format!("removing {}", path.display()), e)),
        }
    }

    /// Every indexed build, most recently accessed first
    pub async fn entries(&self) -> DevstageResult<Vec<CacheEntry>> {
        let read_err = |e| DevstageError::io(format!("listing {}", self.dir.display()), e);
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(read_err(e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(read_err)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let last_access = match Self::recorded_time(&entry.path()).await {
                Some(time) => time,
                None => continue,
            };
            entries.push(CacheEntry {
                build_id: name.replace(DELIMITER, "/"),
                last_access,
            });
        }

        entries.sort_by(|a, b| {
            b.last_access
                .cmp(&a.last_access)
                .then_with(|| a.build_id.cmp(&b.build_id))
        });
        Ok(entries)
    }

    async fn recorded_time(path: &Path) -> Option<DateTime<Utc>> {
        let content = fs::read_to_string(path).await.ok()?;
        if let Ok(time) = DateTime::parse_from_rfc3339(content.trim()) {
            return Some(time.with_timezone(&Utc));
        }
        let modified = fs::metadata(path).await.ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }
}
