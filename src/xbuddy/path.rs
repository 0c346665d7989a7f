//! xbuddy path parsing and image aliases

use crate::artifact::names::{
    AUTOTEST, AUTOTEST_DIR, BASE_IMAGE, BASE_IMAGE_FILE, FULL_PAYLOAD, RECOVERY_IMAGE,
    RECOVERY_IMAGE_FILE, STATEFUL_FILE, STATEFUL_PAYLOAD, TEST_IMAGE, TEST_IMAGE_FILE,
    UPDATE_FILE,
};
use crate::error::{DevstageError, DevstageResult};
use crate::xbuddy::version::LATEST;

pub const DEFAULT_ALIAS: &str = "test";
const DEV_IMAGE_FILE: &str = "chromiumos_image.bin";

/// Alias, staged file, registry artifact
const REMOTE_ALIASES: &[(&str, &str, &str)] = &[
    ("test", TEST_IMAGE_FILE, TEST_IMAGE),
    ("base", BASE_IMAGE_FILE, BASE_IMAGE),
    ("recovery", RECOVERY_IMAGE_FILE, RECOVERY_IMAGE),
    ("full_payload", UPDATE_FILE, FULL_PAYLOAD),
    ("stateful", STATEFUL_FILE, STATEFUL_PAYLOAD),
    ("autotest", AUTOTEST_DIR, AUTOTEST),
];

/// Alias, image file in a local build
const LOCAL_ALIASES: &[(&str, &str)] = &[
    ("test", TEST_IMAGE_FILE),
    ("base", BASE_IMAGE_FILE),
    ("dev", DEV_IMAGE_FILE),
];

/// Remote alias as (file name, artifact name)
pub fn remote_alias(alias: &str) -> DevstageResult<(&'static str, &'static str)> {
    REMOTE_ALIASES
        .iter()
        .find(|(name, _, _)| *name == alias)
        .map(|(_, file, artifact)| (*file, *artifact))
        .ok_or_else(|| DevstageError::AliasUnknown {
            alias: alias.to_string(),
            expected: REMOTE_ALIASES
                .iter()
                .map(|(name, _, _)| *name)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Image file of a local build alias
pub fn local_alias(alias: &str) -> DevstageResult<&'static str> {
    LOCAL_ALIASES
        .iter()
        .find(|(name, _)| *name == alias)
        .map(|(_, file)| *file)
        .ok_or_else(|| DevstageError::AliasUnknown {
            alias: alias.to_string(),
            expected: LOCAL_ALIASES
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// `board[/version[/alias]]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XbuddyPath {
    pub board: String,
    pub version: String,
    pub alias: String,
}

impl XbuddyPath {
    /// Missing segments default to version `latest` and alias `test`
    pub fn parse(path: &str) -> DevstageResult<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let (board, version, alias) = match segments.as_slice() {
            [board] => (*board, LATEST, DEFAULT_ALIAS),
            [board, version] => (*board, *version, DEFAULT_ALIAS),
            [board, version, alias] => (*board, *version, *alias),
            _ => return Err(DevstageError::PathSpecInvalid(path.to_string())),
        };

        if board.is_empty() {
            return Err(DevstageError::PathSpecInvalid(path.to_string()));
        }

        Ok(Self {
            board: board.to_string(),
            version: version.to_string(),
            alias: alias.to_string(),
        })
    }
}
