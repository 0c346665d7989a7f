//! Remote store backed by the gsutil command line tool
//!
//! Implements the RemoteStore trait by shelling out to `gsutil`. Errors are
//! classified from the exit code and stderr so that missing objects are not
//! retried while flaky network failures are.

use crate::error::{DevstageError, DevstageResult};
use crate::store::RemoteStore;
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// stderr fragments gsutil prints when the object does not exist
const NOT_FOUND_MARKERS: &[&str] = &[
    "matched no objects",
    "No URLs matched",
    "non-existent object",
];

/// Remote store using the gsutil CLI
pub struct GsutilStore {
    bin: String,
}

impl GsutilStore {
    /// Create a store invoking `bin`
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Execute a gsutil command and return the output
    async fn exec(&self, args: &[&str]) -> DevstageResult<Output> {
        debug!("Executing: {} {:?}", self.bin, args);

        Command::new(&self.bin)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    self.not_installed()
                } else {
                    DevstageError::command_failed(format!("{} {:?}", self.bin, args), e)
                }
            })
    }

    /// Execute and map a non-zero exit to the matching error class
    async fn exec_checked(
        &self,
        operation: &str,
        target: &str,
        args: &[&str],
    ) -> DevstageResult<Output> {
        let output = self.exec(args).await?;
        if output.status.success() {
            return Ok(output);
        }
        Err(self.classify(operation, target, &output))
    }

    fn classify(&self, operation: &str, target: &str, output: &Output) -> DevstageError {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.code() == Some(127) {
            return self.not_installed();
        }
        if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
            return DevstageError::RemoteNotFound(target.to_string());
        }
        DevstageError::remote(
            format!("{} {}", operation, target),
            format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        )
    }

    fn not_installed(&self) -> DevstageError {
        DevstageError::CliNotFound {
            name: self.bin.clone(),
            hint: "gsutil must be on PATH to reach the archive".to_string(),
        }
    }
}

impl Default for GsutilStore {
    fn default() -> Self {
        Self::new("gsutil")
    }
}

#[async_trait]
impl RemoteStore for GsutilStore {
    async fn list(&self, dir: &str) -> DevstageResult<Vec<String>> {
        let target = format!("{}/", dir.trim_end_matches('/'));
        let output = self.exec_checked("ls", &target, &["ls", target.as_str()]).await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn get(&self, remote: &str, local: &Path) -> DevstageResult<()> {
        let local_str = local.to_string_lossy();
        self.exec_checked("cp", remote, &["cp", remote, local_str.as_ref()])
            .await?;
        Ok(())
    }

    async fn cat(&self, remote: &str) -> DevstageResult<String> {
        let output = self.exec_checked("cat", remote, &["cat", remote]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn backend_name(&self) -> &'static str {
        "gsutil"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn output(code: i32, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn classify_not_found() {
        let store = GsutilStore::default();
        let err = store.classify(
            "cat",
            "gs://b/UPLOADED",
            &output(1, "CommandException: No URLs matched: gs://b/UPLOADED"),
        );
        assert!(matches!(err, DevstageError::RemoteNotFound(ref t) if t == "gs://b/UPLOADED"));
    }

    #[test]
    fn classify_transient() {
        let store = GsutilStore::default();
        let err = store.classify("ls", "gs://b/", &output(1, "503 Service Unavailable"));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn classify_missing_tool() {
        let store = GsutilStore::default();
        let err = store.classify("ls", "gs://b/", &output(127, ""));
        assert!(matches!(err, DevstageError::CliNotFound { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let store = GsutilStore::new("devstage-no-such-gsutil");
        let err = store.list("gs://bucket/dir").await.unwrap_err();
        assert!(matches!(err, DevstageError::CliNotFound { .. }));
    }
}
