//! Mapping from archive URLs to local build directories

use crate::artifact::ArtifactFactory;
use crate::cache::ErrorStore;
use std::path::{Path, PathBuf};

/// One build's namespace, remote and local
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLocation {
    /// Remote root the build's artifacts are listed under
    pub archive_url: String,
    /// Path between the bucket and the build (e.g. `x86-alex-release`)
    pub rel_path: String,
    /// Build name (e.g. `R26-4000.0.0`)
    pub build: String,
    /// Local install dir under the static dir
    pub build_dir: PathBuf,
}

impl BuildLocation {
    /// `gs://bucket/<rel_path>/<build>` stages into `<static_dir>/<rel_path>/<build>`;
    /// a local path stages into `<static_dir>/<parent name>/<name>`.
    pub fn from_archive_url(static_dir: &Path, archive_url: &str) -> Self {
        let archive_url = archive_url.trim_end_matches('/').to_string();

        let (rel_path, build) = match archive_url.split_once("://") {
            Some((_, sub)) => {
                let parts: Vec<&str> = sub.split('/').collect();
                let build = parts.last().copied().unwrap_or_default().to_string();
                let rel_path = if parts.len() > 2 {
                    parts[1..parts.len() - 1].join("/")
                } else {
                    String::new()
                };
                (rel_path, build)
            }
            None => {
                let path = Path::new(&archive_url);
                let name = |p: Option<&Path>| {
                    p.and_then(Path::file_name)
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                };
                (name(path.parent()), name(Some(path)))
            }
        };

        let mut build_dir = static_dir.to_path_buf();
        if !rel_path.is_empty() {
            build_dir.push(&rel_path);
        }
        build_dir.push(&build);

        Self {
            archive_url,
            rel_path,
            build,
            build_dir,
        }
    }

    /// Build id as used by the build cache (`<rel_path>/<build>`)
    pub fn build_id(&self) -> String {
        if self.rel_path.is_empty() {
            self.build.clone()
        } else {
            format!("{}/{}", self.rel_path, self.build)
        }
    }

    pub fn factory(&self) -> ArtifactFactory {
        ArtifactFactory::new(&self.build_dir, &self.archive_url, &self.build)
    }

    pub fn errors(&self) -> ErrorStore {
        ErrorStore::for_build(&self.build_dir)
    }
}
