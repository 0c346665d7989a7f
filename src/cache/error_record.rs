//! Persisted staging failures
//!
//! Records live in a sibling of the build directory (`<build_dir>.errors/`)
//! so they survive the build directory being removed after a failure.

use crate::cache::marker::sanitize;
use crate::error::{ArtifactErrorKind, DevstageError, DevstageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Last staging failure for one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub artifact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ArtifactErrorKind>,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn from_error(artifact: &str, err: &DevstageError) -> Self {
        Self {
            artifact: artifact.to_string(),
            kind: err.artifact_kind(),
            message: err.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// Error records for one build
#[derive(Debug, Clone)]
pub struct ErrorStore {
    dir: PathBuf,
}

impl ErrorStore {
    pub fn for_build(build_dir: &Path) -> Self {
        let mut name = build_dir
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".errors");
        Self {
            dir: build_dir.with_file_name(name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, artifact: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(artifact)))
    }

    pub async fn save(&self, record: &ErrorRecord) -> DevstageResult<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            DevstageError::io(format!("creating directory {}", self.dir.display()), e)
        })?;

        let path = self.record_path(&record.artifact);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)
            .await
            .map_err(|e| DevstageError::io(format!("writing {}", path.display()), e))?;
        debug!("Recorded failure of {} at {}", record.artifact, path.display());
        Ok(())
    }

    pub async fn load(&self, artifact: &str) -> DevstageResult<Option<ErrorRecord>> {
        let path = self.record_path(artifact);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DevstageError::io(format!("reading {}", path.display()), e)),
        }
    }

    /// Forget a previous failure before a new attempt
    pub async fn clear(&self, artifact: &str) -> DevstageResult<()> {
        let path = self.record_path(artifact);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DevstageError::io(format!("removing {}", path.display()), e)),
        }
    }

    /// Drop every record for the build
    pub async fn remove_all(&self) -> DevstageResult<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DevstageError::io(
                format!("removing {}", self.dir.display()),
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn errors_dir_is_sibling() {
        let store = ErrorStore::for_build(Path::new("/static/board-release/R1-1.0.0"));
        assert_eq!(
            store.dir(),
            Path::new("/static/board-release/R1-1.0.0.errors")
        );
    }

    #[tokio::test]
    async fn save_load_clear() {
        let temp = TempDir::new().unwrap();
        let build_dir = temp.path().join("R1-1.0.0");
        let store = ErrorStore::for_build(&build_dir);

        assert_eq!(store.load("stateful").await.unwrap(), None);

        let err = DevstageError::artifact("stateful", ArtifactErrorKind::NotFound, "no match");
        let record = ErrorRecord::from_error("stateful", &err);
        store.save(&record).await.unwrap();

        let loaded = store.load("stateful").await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.kind, Some(ArtifactErrorKind::NotFound));
        assert!(!build_dir.exists());

        store.clear("stateful").await.unwrap();
        assert_eq!(store.load("stateful").await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_survive_build_dir_removal() {
        let temp = TempDir::new().unwrap();
        let build_dir = temp.path().join("R1-1.0.0");
        std::fs::create_dir_all(&build_dir).unwrap();
        let store = ErrorStore::for_build(&build_dir);

        let err = DevstageError::remote("download", "reset");
        store
            .save(&ErrorRecord::from_error("autotest", &err))
            .await
            .unwrap();
        std::fs::remove_dir_all(&build_dir).unwrap();

        let loaded = store.load("autotest").await.unwrap().unwrap();
        assert_eq!(loaded.kind, None);
        assert!(loaded.message.contains("reset"));
    }
}
