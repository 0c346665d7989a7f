//! Keyed locks serializing staging and eviction
//!
//! Artifact locks are keyed by (install dir, artifact name) so unrelated
//! artifacts never contend. Build locks are reader/writer locks keyed by the
//! build directory: staging holds them shared, deleting a build takes them
//! exclusively.
//!
//! Entries are held weakly and pruned once no guard references them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{
    Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};
use tracing::debug;

type ArtifactKey = (PathBuf, String);

/// Held while one artifact is being staged
pub type ArtifactGuard = OwnedMutexGuard<()>;

/// Held while staging into a build directory
pub type BuildSharedGuard = OwnedRwLockReadGuard<()>;

/// Held while deleting a build directory
pub type BuildExclusiveGuard = OwnedRwLockWriteGuard<()>;

/// Registry of per-artifact and per-build locks
#[derive(Default)]
pub struct LockRegistry {
    artifacts: Mutex<HashMap<ArtifactKey, Weak<AsyncMutex<()>>>>,
    builds: Mutex<HashMap<PathBuf, Weak<RwLock<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one artifact of one install dir
    pub async fn artifact(&self, install_dir: &Path, name: &str) -> ArtifactGuard {
        let lock = {
            let mut map = lock_map(&self.artifacts);
            map.retain(|_, weak| weak.strong_count() > 0);
            let key = (install_dir.to_path_buf(), name.to_string());
            upgrade_or_insert(&mut map, key, || AsyncMutex::new(()))
        };
        debug!("Locking artifact {} in {}", name, install_dir.display());
        lock.lock_owned().await
    }

    /// Wait for shared access to a build directory
    pub async fn build_shared(&self, build_dir: &Path) -> BuildSharedGuard {
        self.build_lock(build_dir).read_owned().await
    }

    /// Wait until no stage is running in a build directory, then block new ones
    pub async fn build_exclusive(&self, build_dir: &Path) -> BuildExclusiveGuard {
        debug!("Locking build {} exclusively", build_dir.display());
        self.build_lock(build_dir).write_owned().await
    }

    /// Exclusive access to a build directory, unless someone is using it
    pub fn try_build_exclusive(&self, build_dir: &Path) -> Option<BuildExclusiveGuard> {
        self.build_lock(build_dir).try_write_owned().ok()
    }

    fn build_lock(&self, build_dir: &Path) -> Arc<RwLock<()>> {
        let mut map = lock_map(&self.builds);
        map.retain(|_, weak| weak.strong_count() > 0);
        upgrade_or_insert(&mut map, build_dir.to_path_buf(), || RwLock::new(()))
    }

    /// Number of live lock entries (artifact, build)
    pub fn live_entries(&self) -> (usize, usize) {
        let artifacts = lock_map(&self.artifacts)
            .values()
            .filter(|w| w.strong_count() > 0)
            .count();
        let builds = lock_map(&self.builds)
            .values()
            .filter(|w| w.strong_count() > 0)
            .count();
        (artifacts, builds)
    }
}

fn lock_map<K, V>(map: &Mutex<HashMap<K, V>>) -> MutexGuard<'_, HashMap<K, V>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn upgrade_or_insert<K, T>(
    map: &mut HashMap<K, Weak<T>>,
    key: K,
    make: impl FnOnce() -> T,
) -> Arc<T>
where
    K: std::hash::Hash + Eq,
{
    if let Some(existing) = map.get(&key).and_then(Weak::upgrade) {
        return existing;
    }
    let fresh = Arc::new(make());
    map.insert(key, Arc::downgrade(&fresh));
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = Arc::new(LockRegistry::new());
        let dir = PathBuf::from("/static/board/R1-1.0.0");

        let first = locks.artifact(&dir, "stateful").await;
        let blocked = timeout(Duration::from_millis(50), locks.artifact(&dir, "stateful")).await;
        assert!(blocked.is_err());

        drop(first);
        let second = timeout(Duration::from_millis(50), locks.artifact(&dir, "stateful")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = LockRegistry::new();
        let dir = PathBuf::from("/static/board/R1-1.0.0");

        let _stateful = locks.artifact(&dir, "stateful").await;
        let other_name = timeout(Duration::from_millis(50), locks.artifact(&dir, "autotest")).await;
        assert!(other_name.is_ok());

        let other_dir = PathBuf::from("/static/board/R2-1.0.0");
        let same_name_elsewhere =
            timeout(Duration::from_millis(50), locks.artifact(&other_dir, "stateful")).await;
        assert!(same_name_elsewhere.is_ok());
    }

    #[tokio::test]
    async fn exclusive_waits_for_shared() {
        let locks = LockRegistry::new();
        let dir = PathBuf::from("/static/board/R1-1.0.0");

        let reader_a = locks.build_shared(&dir).await;
        let reader_b = locks.build_shared(&dir).await;

        let writer = timeout(Duration::from_millis(50), locks.build_exclusive(&dir)).await;
        assert!(writer.is_err());

        assert!(locks.try_build_exclusive(&dir).is_none());

        drop(reader_a);
        drop(reader_b);
        let writer = timeout(Duration::from_millis(50), locks.build_exclusive(&dir)).await;
        assert!(writer.is_ok());
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = LockRegistry::new();
        let dir = PathBuf::from("/static/board/R1-1.0.0");

        {
            let _a = locks.artifact(&dir, "stateful").await;
            let _b = locks.build_shared(&dir).await;
            assert_eq!(locks.live_entries(), (1, 1));
        }
        assert_eq!(locks.live_entries(), (0, 0));
    }
}
