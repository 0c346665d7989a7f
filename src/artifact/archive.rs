//! Archive extraction through the system `tar` and `unzip` tools

use crate::cache::path_exists;
use crate::error::{ArtifactErrorKind, DevstageError, DevstageResult};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Decompressor for a tarball, picked from its extension
pub fn compression_program(archive: &Path) -> Option<&'static str> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
        Some("gzip")
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        Some("bzip2")
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Some("xz")
    } else {
        None
    }
}

/// Zip entries `unzip` will extract for the given member and exclude globs
pub fn select_zip_members(
    entries: &[String],
    include: &[String],
    exclude: &[String],
) -> Vec<String> {
    let include: Vec<glob::Pattern> = include.iter().map(|p| member_pattern(p)).collect();
    let exclude: Vec<glob::Pattern> = exclude.iter().map(|p| member_pattern(p)).collect();

    entries
        .iter()
        .filter(|e| !e.ends_with('/'))
        .filter(|e| include.is_empty() || include.iter().any(|p| p.matches(e)))
        .filter(|e| !exclude.iter().any(|p| p.matches(e)))
        .cloned()
        .collect()
}

/// Wildcard pattern for a member argument; malformed ones match literally
fn member_pattern(member: &str) -> glob::Pattern {
    glob::Pattern::new(member)
        .or_else(|_| glob::Pattern::new(&glob::Pattern::escape(member)))
        .unwrap_or_default()
}

/// Extract a tarball into `dest`, returning the extracted file paths
pub async fn extract_tar(
    artifact: &str,
    archive: &Path,
    dest: &Path,
    members: &[String],
    exclude: &[String],
) -> DevstageResult<Vec<PathBuf>> {
    let mut cmd = Command::new("tar");
    cmd.arg("-x").arg("-v").arg("-f").arg(archive).arg("-C").arg(dest);
    if let Some(program) = compression_program(archive) {
        cmd.arg(format!("--use-compress-program={}", program));
    }
    for pattern in exclude {
        cmd.arg(format!("--exclude={}", pattern));
    }
    cmd.args(members);

    let output = run(artifact, "tar", cmd).await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    // GNU tar lists members on stdout; bsdtar prefixes them with "x " on stderr
    let listed: Vec<&str> = if stdout.trim().is_empty() {
        stderr
            .lines()
            .filter_map(|l| l.strip_prefix("x "))
            .collect()
    } else {
        stdout.lines().collect()
    };

    let mut files = Vec::new();
    for name in listed {
        let name = name.trim().trim_start_matches("./");
        if name.is_empty() || name.ends_with('/') {
            continue;
        }
        let path = dest.join(name);
        if !files.contains(&path) {
            files.push(path);
        }
    }

    debug!("Extracted {} files from {}", files.len(), archive.display());
    Ok(files)
}

/// Extract a zip into `dest`.
///
/// The archive is listed first so the result is exactly the set of entries
/// selected by the filters that exist after extraction.
pub async fn extract_zip(
    artifact: &str,
    archive: &Path,
    dest: &Path,
    members: &[String],
    exclude: &[String],
) -> DevstageResult<Vec<PathBuf>> {
    let mut list = Command::new("unzip");
    list.arg("-Z1").arg(archive);
    let listing = run(artifact, "unzip", list).await?;
    let entries: Vec<String> = String::from_utf8_lossy(&listing.stdout)
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    let selected = select_zip_members(&entries, members, exclude);

    let mut cmd = Command::new("unzip");
    cmd.arg("-o").arg(archive).arg("-d").arg(dest);
    cmd.args(members);
    if !exclude.is_empty() {
        cmd.arg("-x").args(exclude);
    }
    run(artifact, "unzip", cmd).await?;

    let mut files = Vec::with_capacity(selected.len());
    for entry in selected {
        let path = dest.join(&entry);
        if path_exists(&path).await {
            files.push(path);
        }
    }

    debug!("Extracted {} files from {}", files.len(), archive.display());
    Ok(files)
}

async fn run(artifact: &str, tool: &str, mut cmd: Command) -> DevstageResult<Output> {
    debug!("Executing: {:?}", cmd.as_std());

    let output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DevstageError::CliNotFound {
                    name: tool.to_string(),
                    hint: format!("{} is required to extract archives", tool),
                }
            } else {
                DevstageError::command_failed(tool, e)
            }
        })?;

    if !output.status.success() {
        return Err(DevstageError::artifact(
            artifact,
            ArtifactErrorKind::Extraction,
            format!(
                "{} exited with {}: {}",
                tool,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    Ok(output)
}
