//! In-memory remote store for tests

use crate::error::{DevstageError, DevstageResult};
use crate::store::RemoteStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Objects keyed by full remote path, with failure injection and call counting
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    downloads: Mutex<Vec<String>>,
    list_failures: AtomicU32,
    get_failures: AtomicU32,
    list_calls: AtomicU32,
    get_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
    }

    /// Make the next `n` list calls fail transiently
    pub fn fail_lists(&self, n: u32) {
        self.list_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` get calls fail transiently
    pub fn fail_gets(&self, n: u32) {
        self.get_failures.store(n, Ordering::SeqCst);
    }

    /// Sleep this long inside every get
    pub fn set_get_delay(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = Some(delay);
    }

    /// Remote paths downloaded so far, in order
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn read(&self, remote: &str) -> DevstageResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(remote)
            .cloned()
            .ok_or_else(|| DevstageError::RemoteNotFound(remote.to_string()))
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(&self, dir: &str) -> DevstageResult<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.list_failures) {
            return Err(DevstageError::remote("ls", "injected failure"));
        }

        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let objects = self.objects.lock().unwrap();
        let mut children: Vec<String> = Vec::new();
        for key in objects.keys().filter(|k| k.starts_with(&prefix)) {
            let rest = &key[prefix.len()..];
            let child = match rest.split_once('/') {
                Some((sub, _)) => format!("{}{}/", prefix, sub),
                None => key.clone(),
            };
            if !children.contains(&child) {
                children.push(child);
            }
        }

        if children.is_empty() {
            return Err(DevstageError::RemoteNotFound(dir.to_string()));
        }
        Ok(children)
    }

    async fn get(&self, remote: &str, local: &Path) -> DevstageResult<()> {
        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.get_failures) {
            return Err(DevstageError::remote("cp", "injected failure"));
        }

        let data = self.read(remote)?;
        tokio::fs::write(local, data)
            .await
            .map_err(|e| DevstageError::io(format!("writing {}", local.display()), e))?;
        self.downloads.lock().unwrap().push(remote.to_string());
        Ok(())
    }

    async fn cat(&self, remote: &str) -> DevstageResult<String> {
        Ok(String::from_utf8_lossy(&self.read(remote)?).into_owned())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
