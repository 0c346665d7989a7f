//! Build version forms and ordering

use crate::error::{DevstageError, DevstageResult};
use std::cmp::Ordering;

pub const LATEST: &str = "latest";
pub const LATEST_LOCAL: &str = "latest-local";
pub const LATEST_OFFICIAL: &str = "latest-official";
pub const RELEASE: &str = "release";
pub const DEFAULT_CHANNEL: &str = "stable";

/// Strip a leading `x.y.z` from `s`, returning the rest
fn strip_triple(s: &str) -> Option<&str> {
    let mut rest = s;
    for i in 0..3 {
        if i > 0 {
            rest = rest.strip_prefix('.')?;
        }
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return None;
        }
        rest = &rest[digits..];
    }
    Some(rest)
}

/// `R26-4000.0.0` and friends, as found in the image archive
pub fn is_full_version(version: &str) -> bool {
    let Some(rest) = version.strip_prefix('R') else {
        return false;
    };
    let milestone = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    milestone > 0
        && rest[milestone..]
            .strip_prefix('-')
            .and_then(strip_triple)
            .is_some()
}

/// `4000.0.0` as found under release channel directories
pub fn is_short_version(version: &str) -> bool {
    strip_triple(version) == Some("")
}

/// How a version segment of an xbuddy path is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// Newest image produced by a local `build_image`
    Local,
    /// A complete version, used as-is
    Full(String),
    /// The `LATEST-master` build of `<board>-<suffix>`
    LatestOfficial { suffix: String },
    /// Newest release on a channel
    LatestChannel { channel: String },
    /// Newest image whose version starts with the prefix
    LatestPrefix { prefix: String },
}

impl VersionSpec {
    pub fn parse(version: &str) -> DevstageResult<Self> {
        if version.is_empty() || version == LATEST_LOCAL {
            return Ok(Self::Local);
        }
        if is_full_version(version) {
            return Ok(Self::Full(version.to_string()));
        }
        if version == LATEST_OFFICIAL {
            return Ok(Self::LatestOfficial {
                suffix: RELEASE.to_string(),
            });
        }
        if version == LATEST {
            return Ok(Self::LatestChannel {
                channel: DEFAULT_CHANNEL.to_string(),
            });
        }

        if let Some(suffix) = version.strip_prefix("latest-official-") {
            if !suffix.is_empty() {
                return Ok(Self::LatestOfficial {
                    suffix: suffix.to_string(),
                });
            }
        }
        if let Some(rest) = version.strip_prefix("latest-") {
            let milestone = rest
                .strip_prefix('R')
                .is_some_and(|m| m.starts_with(|c: char| c.is_ascii_digit()));
            if milestone {
                return Ok(Self::LatestPrefix {
                    prefix: rest.to_string(),
                });
            }
            if !rest.is_empty() && !rest.contains('-') {
                return Ok(Self::LatestChannel {
                    channel: rest.to_string(),
                });
            }
        }

        Err(DevstageError::VersionUnknown(version.to_string()))
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Part<'a> {
    Num(u64),
    Text(&'a str),
}

fn parts(version: &str) -> Vec<Part<'_>> {
    let mut out = Vec::new();
    let bytes = version.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        let is_digit = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() == is_digit {
            end += 1;
        }
        let run = &version[start..end];
        if is_digit {
            out.push(run.parse().map(Part::Num).unwrap_or(Part::Text(run)));
        } else {
            let text = run.trim_matches(|c| c == '.' || c == '-' || c == '_');
            if !text.is_empty() {
                out.push(Part::Text(text));
            }
        }
        start = end;
    }
    out
}

/// Component-wise comparison; digit runs compare numerically, so
/// `R26-4000.10.0` sorts after `R26-4000.9.0`
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    parts(a).cmp(&parts(b))
}

/// Newest of `versions`
pub fn latest<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .max_by(|a, b| compare_versions(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_forms() {
        assert_eq!(
            VersionSpec::parse("R26-4000.0.0").unwrap(),
            VersionSpec::Full("R26-4000.0.0".into())
        );
        assert_eq!(VersionSpec::parse("").unwrap(), VersionSpec::Local);
        assert_eq!(VersionSpec::parse("latest-local").unwrap(), VersionSpec::Local);
        assert_eq!(
            VersionSpec::parse("latest").unwrap(),
            VersionSpec::LatestChannel {
                channel: "stable".into()
            }
        );
        assert_eq!(
            VersionSpec::parse("latest-dev").unwrap(),
            VersionSpec::LatestChannel {
                channel: "dev".into()
            }
        );
        assert_eq!(
            VersionSpec::parse("latest-official").unwrap(),
            VersionSpec::LatestOfficial {
                suffix: "release".into()
            }
        );
        assert_eq!(
            VersionSpec::parse("latest-official-paladin").unwrap(),
            VersionSpec::LatestOfficial {
                suffix: "paladin".into()
            }
        );
        assert_eq!(
            VersionSpec::parse("latest-R26").unwrap(),
            VersionSpec::LatestPrefix {
                prefix: "R26".into()
            }
        );
        assert_eq!(
            VersionSpec::parse("latest-R26-4000").unwrap(),
            VersionSpec::LatestPrefix {
                prefix: "R26-4000".into()
            }
        );
        assert!(matches!(
            VersionSpec::parse("yesterday"),
            Err(DevstageError::VersionUnknown(_))
        ));
    }

    #[test]
    fn numeric_runs_compare_numerically() {
        assert_eq!(compare_versions("R26-4000.10.0", "R26-4000.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("R9-1.0.0", "R10-1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(
            latest(["4000.0.0", "3999.9.9", "4000.0.10"]),
            Some("4000.0.10")
        );
        assert_eq!(latest(Vec::<&str>::new()), None);
    }

    #[test]
    fn version_patterns() {
        assert!(is_full_version("R26-4000.0.0"));
        assert!(is_full_version("R26-4000.0.0-rc1"));
        assert!(!is_full_version("4000.0.0"));
        assert!(is_short_version("4000.0.0"));
        assert!(!is_short_version("R26-4000.0.0"));
    }
}
