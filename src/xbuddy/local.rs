//! Images produced by a local `build_image`
//!
//! Local builds live under `<images_dir>/<board>/<version>` with a `latest`
//! link per board. They are served by linking them into the static dir.

use crate::error::{DevstageError, DevstageResult};
use crate::xbuddy::timestamp::TimestampIndex;
use crate::xbuddy::version::LATEST;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Directory the board's `latest` link points at
pub async fn latest_local_dir(images_dir: &Path, board: &str) -> DevstageResult<PathBuf> {
    let latest = images_dir.join(board).join(LATEST);
    fs::canonicalize(&latest).await.map_err(|_| {
        DevstageError::LocalBuildNotFound(format!(
            "no builds for {} in {}",
            board,
            images_dir.display()
        ))
    })
}

/// Point `link` at `target`, replacing whatever was there
pub async fn replace_symlink(target: &Path, link: &Path) -> DevstageResult<()> {
    if fs::symlink_metadata(link).await.is_ok() {
        fs::remove_file(link)
            .await
            .map_err(|e| DevstageError::io(format!("removing {}", link.display()), e))?;
    }
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            DevstageError::io(format!("creating directory {}", parent.display()), e)
        })?;
    }

    symlink_dir(target, link).await.map_err(|e| {
        DevstageError::io(format!("linking {} to {}", link.display(), target.display()), e)
    })?;
    debug!("Linked {} -> {}", link.display(), target.display());
    Ok(())
}

#[cfg(unix)]
async fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    fs::symlink(target, link).await
}

#[cfg(windows)]
async fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    fs::symlink_dir(target, link).await
}

/// Link the newest local build of `board` into the static dir.
///
/// Returns the version, which is the build directory's name.
pub async fn link_latest(
    images_dir: &Path,
    static_dir: &Path,
    board: &str,
    file_name: &str,
) -> DevstageResult<String> {
    let build_dir = latest_local_dir(images_dir, board).await?;
    let version = build_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            DevstageError::LocalBuildNotFound(format!("{} has no version name", build_dir.display()))
        })?;

    if fs::metadata(build_dir.join(file_name)).await.is_err() {
        return Err(DevstageError::LocalBuildNotFound(format!(
            "{} not found in {}",
            file_name,
            build_dir.display()
        )));
    }

    replace_symlink(&build_dir, &static_dir.join(board).join(&version)).await?;
    Ok(version)
}

/// Link every local build not yet indexed into the static dir, and index
/// them when the cache manages local builds
pub async fn sync_local_builds(
    images_dir: &Path,
    static_dir: &Path,
    index: &TimestampIndex,
    manage_builds: bool,
    now: DateTime<Utc>,
) -> DevstageResult<()> {
    let list_err = |dir: &Path, e| DevstageError::io(format!("listing {}", dir.display()), e);

    let mut boards = match fs::read_dir(images_dir).await {
        Ok(boards) => boards,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(list_err(images_dir, e)),
    };

    let mut build_ids = Vec::new();
    while let Some(board) = boards.next_entry().await.map_err(|e| list_err(images_dir, e))? {
        let board_dir = board.path();
        if !fs::metadata(&board_dir).await.is_ok_and(|m| m.is_dir()) {
            continue;
        }
        let board = board.file_name().to_string_lossy().into_owned();

        let mut versions = fs::read_dir(&board_dir)
            .await
            .map_err(|e| list_err(&board_dir, e))?;
        while let Some(version) = versions.next_entry().await.map_err(|e| list_err(&board_dir, e))? {
            let version = version.file_name().to_string_lossy().into_owned();
            if version != LATEST {
                build_ids.push(format!("{}/{}", board, version));
            }
        }
    }

    for build_id in build_ids {
        if index.contains(&build_id).await {
            continue;
        }
        if !TimestampIndex::accepts(&build_id) {
            warn!("Skipping local build {}: id cannot be indexed", build_id);
            continue;
        }
        replace_symlink(&images_dir.join(&build_id), &static_dir.join(&build_id)).await?;
        if manage_builds {
            info!("Registering local build {}", build_id);
            index.touch(&build_id, now).await?;
        }
    }
    Ok(())
}
