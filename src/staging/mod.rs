//! Staging orchestration
//!
//! [`Stager`] is the entry point for staging a build's artifacts. It owns the
//! object store and lock registry shared by every request and splits work
//! into a synchronous required set and a best-effort background set.
//!
//! ## Stage Flow
//!
//! | Step | Lock held | Failure |
//! |------|-----------|---------|
//! | Bind names to handlers | none | `UnknownArtifact`, nothing touched |
//! | Create build dir, touch timestamp | build (shared) | I/O error |
//! | Stage required artifacts in order | build (shared) + artifact | first error aborts, error recorded |
//! | Remove an empty build dir | build (exclusive, if free) | logged |
//! | Schedule prefetch artifacts | per task | recorded, never returned |

mod background;
mod location;

pub use background::{BackgroundJob, BackgroundQueue, JobStatus};
pub use location::BuildLocation;

use crate::artifact::names::TIMESTAMP_FILE;
use crate::artifact::{process, ArtifactHandler, StageContext, StagedArtifact};
use crate::cache::{ErrorRecord, LockRegistry};
use crate::config::schema::StagingConfig;
use crate::config::Config;
use crate::error::{DevstageError, DevstageResult};
use crate::store::ObjectStore;
use chrono::{DateTime, Local};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

/// Result of a [`Stager::stage`] call
#[derive(Debug, Default)]
pub struct StageOutcome {
    /// Required artifacts staged before returning
    pub staged: Vec<StagedArtifact>,
    /// Artifacts handed to background workers
    pub scheduled: Vec<BackgroundJob>,
}

/// Stages build artifacts into the static dir
pub struct Stager {
    static_dir: PathBuf,
    store: Arc<ObjectStore>,
    locks: Arc<LockRegistry>,
    staging: StagingConfig,
    background: BackgroundQueue,
}

impl Stager {
    pub fn new(
        static_dir: impl Into<PathBuf>,
        store: Arc<ObjectStore>,
        locks: Arc<LockRegistry>,
        staging: StagingConfig,
    ) -> Self {
        Self {
            static_dir: static_dir.into(),
            store,
            locks,
            staging,
            background: BackgroundQueue::new(),
        }
    }

    /// Stager over the configured remote backend with a fresh lock registry
    pub fn from_config(config: &Config) -> DevstageResult<Self> {
        let store = ObjectStore::from_config(&config.remote)?;
        Ok(Self::new(
            &config.storage.static_dir,
            Arc::new(store),
            Arc::new(LockRegistry::new()),
            config.staging.clone(),
        ))
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    /// Local layout for an archive URL
    pub fn location(&self, archive_url: &str) -> BuildLocation {
        BuildLocation::from_archive_url(&self.static_dir, archive_url)
    }

    /// Context waiting the full window for objects to appear
    pub fn context(&self) -> StageContext {
        StageContext {
            store: self.store.clone(),
            locks: self.locks.clone(),
            timeout: self.staging.wait_timeout(),
            short_timeout: self.staging.no_wait_timeout(),
            poll_interval: self.staging.poll_interval(),
        }
    }

    /// Stage `artifacts` and raw `files` of one build.
    ///
    /// Required artifacts stage in order and the first failure is returned.
    /// With `background` they are scheduled instead and the call returns as
    /// soon as the build dir is prepared. Implied prefetch artifacts are
    /// always scheduled in the background, once the required set is done.
    pub async fn stage(
        &self,
        location: &BuildLocation,
        artifacts: &[String],
        files: &[String],
        background: bool,
    ) -> DevstageResult<StageOutcome> {
        let factory = location.factory();
        let required = factory.required(artifacts, files)?;
        let optional = factory.optional(artifacts)?;

        let build_guard = self.locks.build_shared(&location.build_dir).await;
        prepare_build_dir(&location.build_dir).await?;

        let ctx = self.context();
        let mut outcome = StageOutcome::default();

        if background {
            info!(
                "Scheduling {} artifacts of {} in the background",
                required.len(),
                location.build_id()
            );
            for handler in required {
                outcome.scheduled.push(self.schedule(handler, &ctx, location));
            }
        } else {
            let errors = location.errors();
            let foreground = ctx.no_wait();
            for handler in &required {
                errors.clear(handler.name()).await?;
                match process(handler.as_ref(), &foreground).await {
                    Ok(staged) => outcome.staged.push(staged),
                    Err(e) => {
                        warn!("Failed to stage {}: {}", handler.name(), e);
                        let record = ErrorRecord::from_error(handler.name(), &e);
                        if let Err(save_err) = errors.save(&record).await {
                            warn!("Could not record failure of {}: {}", handler.name(), save_err);
                        }
                        drop(build_guard);
                        self.try_remove_build_dir(&location.build_dir).await;
                        return Err(e);
                    }
                }
            }
        }
        drop(build_guard);

        for handler in optional {
            outcome.scheduled.push(self.schedule(handler, &ctx, location));
        }

        Ok(outcome)
    }

    fn schedule(
        &self,
        handler: Box<dyn ArtifactHandler>,
        ctx: &StageContext,
        location: &BuildLocation,
    ) -> BackgroundJob {
        self.background.spawn(
            handler,
            ctx.clone(),
            location.build_dir.clone(),
            location.errors(),
        )
    }

    /// True if every named artifact has a valid marker. Never touches the
    /// remote store.
    pub async fn is_staged(
        &self,
        location: &BuildLocation,
        artifacts: &[String],
        files: &[String],
    ) -> DevstageResult<bool> {
        for handler in location.factory().required(artifacts, files)? {
            if !handler.marker().exists().await? {
                debug!("{} is not staged in {}", handler.name(), location.build_dir.display());
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Last persisted failure of `artifact` in this build
    pub async fn get_error(
        &self,
        location: &BuildLocation,
        artifact: &str,
    ) -> DevstageResult<Option<ErrorRecord>> {
        location.errors().load(artifact).await
    }

    /// Wait for the next background result; `None` when nothing is scheduled
    pub async fn next_background_result(&self) -> Option<BackgroundJob> {
        self.background.next().await
    }

    pub fn pending_background(&self) -> usize {
        self.background.outstanding()
    }

    /// Top-level listing of the build dir, or `None` if it was never staged
    pub async fn list_build_dir(&self, location: &BuildLocation) -> DevstageResult<Option<String>> {
        let build_dir = &location.build_dir;
        let meta = match fs::metadata(build_dir).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DevstageError::io(format!("reading {}", build_dir.display()), e))
            }
        };
        if !meta.is_dir() {
            return Err(DevstageError::BuildDirInvalid(build_dir.clone()));
        }

        let read_err = |e| DevstageError::io(format!("listing {}", build_dir.display()), e);
        let mut entries = fs::read_dir(build_dir).await.map_err(read_err)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            paths.push(entry.path());
        }
        paths.sort();

        let mut listing = format!("Listing contents of :{} \n", build_dir.display());
        for path in paths {
            let meta = fs::metadata(&path)
                .await
                .map_err(|e| DevstageError::io(format!("reading {}", path.display()), e))?;
            listing.push_str(&format!(
                "Name: {} Accessed: {} Modified: {} Size: {} bytes.\n",
                path.display(),
                format_time(meta.accessed().ok()),
                format_time(meta.modified().ok()),
                meta.len()
            ));
        }
        Ok(Some(listing))
    }

    /// Remove the build dir after a failed stage if nothing in it was staged.
    ///
    /// Skipped when another request holds the build.
    async fn try_remove_build_dir(&self, build_dir: &Path) {
        let Some(_exclusive) = self.locks.try_build_exclusive(build_dir) else {
            debug!("{} is in use, leaving it in place", build_dir.display());
            return;
        };

        match holds_staged_content(build_dir).await {
            Ok(false) => match fs::remove_dir_all(build_dir).await {
                Ok(()) => info!("Removed unused build dir {}", build_dir.display()),
                Err(e) => warn!("Could not remove {}: {}", build_dir.display(), e),
            },
            Ok(true) => {}
            Err(e) => warn!("Could not inspect {}: {}", build_dir.display(), e),
        }
    }
}

/// Create the build dir and refresh its staging timestamp
async fn prepare_build_dir(build_dir: &Path) -> DevstageResult<()> {
    if let Ok(meta) = fs::metadata(build_dir).await {
        if !meta.is_dir() {
            return Err(DevstageError::BuildDirInvalid(build_dir.to_path_buf()));
        }
    }
    fs::create_dir_all(build_dir).await.map_err(|e| {
        DevstageError::io(format!("creating directory {}", build_dir.display()), e)
    })?;

    let stamp = build_dir.join(TIMESTAMP_FILE);
    let touch_err = |e| DevstageError::io(format!("touching {}", stamp.display()), e);
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&stamp)
        .await
        .map_err(touch_err)?;
    file.into_std()
        .await
        .set_modified(SystemTime::now())
        .map_err(touch_err)?;
    Ok(())
}

/// True if the build dir holds a marker, i.e. some artifact finished staging.
///
/// Markers are the top-level dotfiles; temporary downloads share the prefix
/// but end in `.part`. Archives and members left by a failed stage have no
/// marker and do not count.
async fn holds_staged_content(dir: &Path) -> DevstageResult<bool> {
    let read_err = |e| DevstageError::io(format!("listing {}", dir.display()), e);
    let mut entries = fs::read_dir(dir).await.map_err(read_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with('.') || name.ends_with(".part") {
            continue;
        }
        if entry.file_type().await.map_err(read_err)?.is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn format_time(time: Option<SystemTime>) -> String {
    match time {
        Some(time) => DateTime::<Local>::from(time)
            .format("%Y-%m-%d %H:%M:%S%.6f")
            .to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::names::{FULL_PAYLOAD, STATEFUL_FILE, STATEFUL_PAYLOAD, UPDATE_FILE};
    use crate::artifact::testing::{object, tarball_bytes, ARCHIVE};
    use crate::error::ArtifactErrorKind;
    use crate::store::memory::MemoryStore;
    use crate::store::RetryPolicy;
    use std::time::Duration;
    use tempfile::TempDir;

    const FULL: &str = "chromeos_R26-4000.0.0_x86-alex_full_dev.bin";

    fn stager(static_dir: &Path, backend: Arc<MemoryStore>) -> Stager {
        let store = ObjectStore::new(
            backend,
            RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
            },
        );
        let staging = StagingConfig {
            wait_timeout_secs: 0,
            no_wait_timeout_secs: 0,
            poll_interval_secs: 0,
        };
        Stager::new(static_dir, Arc::new(store), Arc::new(LockRegistry::new()), staging)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn drain(stager: &Stager) -> Vec<BackgroundJob> {
        let mut jobs = Vec::new();
        while let Some(job) = stager.next_background_result().await {
            jobs.push(job);
        }
        jobs
    }

    #[tokio::test]
    async fn unknown_artifact_fails_before_any_listing() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(MemoryStore::new());
        let stager = stager(temp.path(), backend.clone());
        let location = stager.location(ARCHIVE);

        let err = stager
            .stage(&location, &names(&[STATEFUL_PAYLOAD, "bogus"]), &[], false)
            .await
            .unwrap_err();

        assert!(matches!(err, DevstageError::UnknownArtifact(ref n) if n == "bogus"));
        assert_eq!(backend.list_calls(), 0);
        assert!(!location.build_dir.exists());
    }

    #[tokio::test]
    async fn stages_required_and_prefetches_optional() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(MemoryStore::new());
        backend.put(&object(FULL), b"full");
        backend.put(&object(STATEFUL_FILE), b"stateful");
        let stager = stager(temp.path(), backend.clone());
        let location = stager.location(ARCHIVE);

        let outcome = stager
            .stage(&location, &names(&[FULL_PAYLOAD]), &[], false)
            .await
            .unwrap();

        assert_eq!(outcome.staged.len(), 1);
        assert_eq!(outcome.staged[0].files, vec![location.build_dir.join(UPDATE_FILE)]);
        assert_eq!(outcome.scheduled.len(), 1);
        assert_eq!(outcome.scheduled[0].artifact, STATEFUL_PAYLOAD);
        assert!(location.build_dir.join(TIMESTAMP_FILE).exists());

        let jobs = drain(&stager).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Done);
        assert!(stager
            .is_staged(&location, &names(&[FULL_PAYLOAD, STATEFUL_PAYLOAD]), &[])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn concurrent_stage_downloads_once() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(MemoryStore::new());
        backend.put(&object(STATEFUL_FILE), b"stateful");
        backend.set_get_delay(Duration::from_millis(50));
        let stager = stager(temp.path(), backend.clone());
        let location = stager.location(ARCHIVE);
        let requested = names(&[STATEFUL_PAYLOAD]);

        let (a, b) = tokio::join!(
            stager.stage(&location, &requested, &[], false),
            stager.stage(&location, &requested, &[], false)
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(backend.downloads().len(), 1);
    }

    #[tokio::test]
    async fn failed_stage_removes_empty_build_dir_and_records_error() {
        let temp = TempDir::new().unwrap();
        let stager = stager(temp.path(), Arc::new(MemoryStore::new()));
        let location = stager.location(ARCHIVE);

        let err = stager
            .stage(&location, &names(&[STATEFUL_PAYLOAD]), &[], false)
            .await
            .unwrap_err();

        assert_eq!(err.artifact_kind(), Some(ArtifactErrorKind::NotFound));
        assert!(!location.build_dir.exists());

        let record = stager.get_error(&location, STATEFUL_PAYLOAD).await.unwrap().unwrap();
        assert_eq!(record.kind, Some(ArtifactErrorKind::NotFound));
    }

    #[tokio::test]
    async fn failed_stage_keeps_previously_staged_artifacts() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(MemoryStore::new());
        backend.put(&object(STATEFUL_FILE), b"stateful");
        let stager = stager(temp.path(), backend);
        let location = stager.location(ARCHIVE);

        stager
            .stage(&location, &names(&[STATEFUL_PAYLOAD]), &[], false)
            .await
            .unwrap();
        let err = stager
            .stage(&location, &[], &names(&["missing.bin"]), false)
            .await;

        assert!(err.is_err());
        assert!(location.build_dir.join(STATEFUL_FILE).exists());
    }

    #[tokio::test]
    async fn failed_extraction_removes_downloaded_archive() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(MemoryStore::new());
        backend.put(&object("test_suites.tar.bz2"), b"not a bzip2 stream");
        let stager = stager(temp.path(), backend);
        let location = stager.location(ARCHIVE);

        let err = stager
            .stage(&location, &names(&["test_suites"]), &[], false)
            .await
            .unwrap_err();

        assert_eq!(err.artifact_kind(), Some(ArtifactErrorKind::Extraction));
        assert!(!location.build_dir.exists());
    }

    #[tokio::test]
    async fn leftovers_without_marker_do_not_count_as_staged() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("build");
        std::fs::create_dir_all(dir.join("autotest")).unwrap();
        std::fs::write(dir.join(TIMESTAMP_FILE), b"").unwrap();
        std::fs::write(dir.join("autotest.tar"), b"archive").unwrap();
        std::fs::write(dir.join("autotest/README"), b"readme").unwrap();
        std::fs::write(dir.join(".stateful.1234.part"), b"partial").unwrap();
        assert!(!holds_staged_content(&dir).await.unwrap());

        std::fs::write(dir.join(".stateful"), b"").unwrap();
        assert!(holds_staged_content(&dir).await.unwrap());
    }

    #[tokio::test]
    async fn raw_file_does_not_mark_bundle_of_same_archive() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(MemoryStore::new());
        backend.put(
            &object("autotest.tar"),
            &tarball_bytes(&[
                "autotest/README",
                "autotest/client/b.py",
                "autotest/packages/packages.checksum",
            ]),
        );
        let stager = stager(temp.path(), backend);
        let location = stager.location(ARCHIVE);
        let autotest = names(&["autotest"]);

        stager
            .stage(&location, &[], &names(&["autotest.tar"]), false)
            .await
            .unwrap();
        assert!(!stager.is_staged(&location, &autotest, &[]).await.unwrap());

        let outcome = stager.stage(&location, &autotest, &[], false).await.unwrap();
        drain(&stager).await;

        assert!(outcome.staged[0].fresh);
        assert!(location.build_dir.join("autotest/README").exists());
        assert!(stager.is_staged(&location, &autotest, &[]).await.unwrap());
        assert!(stager
            .is_staged(&location, &[], &names(&["autotest.tar"]))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn later_success_clears_recorded_error() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(MemoryStore::new());
        let stager = stager(temp.path(), backend.clone());
        let location = stager.location(ARCHIVE);
        let requested = names(&[STATEFUL_PAYLOAD]);

        assert!(stager.stage(&location, &requested, &[], false).await.is_err());
        backend.put(&object(STATEFUL_FILE), b"stateful");
        stager.stage(&location, &requested, &[], false).await.unwrap();

        assert_eq!(stager.get_error(&location, STATEFUL_PAYLOAD).await.unwrap(), None);
    }

    #[tokio::test]
    async fn background_failure_is_recorded_not_returned() {
        let temp = TempDir::new().unwrap();
        let stager = stager(temp.path(), Arc::new(MemoryStore::new()));
        let location = stager.location(ARCHIVE);

        let outcome = stager
            .stage(&location, &names(&[STATEFUL_PAYLOAD]), &[], true)
            .await
            .unwrap();
        assert!(outcome.staged.is_empty());
        assert_eq!(outcome.scheduled[0].status, JobStatus::Pending);
        assert_eq!(stager.pending_background(), 1);

        let jobs = drain(&stager).await;
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(jobs[0].id, outcome.scheduled[0].id);
        assert!(jobs[0].error.is_some());

        let record = stager.get_error(&location, STATEFUL_PAYLOAD).await.unwrap().unwrap();
        assert_eq!(record.kind, Some(ArtifactErrorKind::NotFound));
    }

    #[tokio::test]
    async fn next_background_result_is_none_when_idle() {
        let temp = TempDir::new().unwrap();
        let stager = stager(temp.path(), Arc::new(MemoryStore::new()));
        assert_eq!(stager.next_background_result().await, None);
    }

    #[tokio::test]
    async fn is_staged_heals_stale_marker_without_listing() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(MemoryStore::new());
        backend.put(&object(STATEFUL_FILE), b"stateful");
        let stager = stager(temp.path(), backend.clone());
        let location = stager.location(ARCHIVE);
        let requested = names(&[STATEFUL_PAYLOAD]);

        stager.stage(&location, &requested, &[], false).await.unwrap();
        let listed = backend.list_calls();
        assert!(stager.is_staged(&location, &requested, &[]).await.unwrap());

        std::fs::remove_file(location.build_dir.join(STATEFUL_FILE)).unwrap();
        assert!(!stager.is_staged(&location, &requested, &[]).await.unwrap());
        assert!(!location.build_dir.join(".stateful").exists());
        assert_eq!(backend.list_calls(), listed);
    }

    #[tokio::test]
    async fn list_build_dir_reports_entries() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(MemoryStore::new());
        backend.put(&object(STATEFUL_FILE), b"stateful");
        let stager = stager(temp.path(), backend);
        let location = stager.location(ARCHIVE);

        assert_eq!(stager.list_build_dir(&location).await.unwrap(), None);

        stager
            .stage(&location, &names(&[STATEFUL_PAYLOAD]), &[], false)
            .await
            .unwrap();
        let listing = stager.list_build_dir(&location).await.unwrap().unwrap();
        assert!(listing.contains(&format!(
            "Name: {} ",
            location.build_dir.join(STATEFUL_FILE).display()
        )));
        assert!(listing.contains("Size: 8 bytes."));
    }

    #[tokio::test]
    async fn build_path_that_is_a_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let stager = stager(temp.path(), Arc::new(MemoryStore::new()));
        let location = stager.location(ARCHIVE);
        std::fs::create_dir_all(location.build_dir.parent().unwrap()).unwrap();
        std::fs::write(&location.build_dir, b"not a dir").unwrap();

        let err = stager.list_build_dir(&location).await.unwrap_err();
        assert!(matches!(err, DevstageError::BuildDirInvalid(_)));

        let err = stager
            .stage(&location, &names(&[STATEFUL_PAYLOAD]), &[], false)
            .await
            .unwrap_err();
        assert!(matches!(err, DevstageError::BuildDirInvalid(_)));
    }
}
