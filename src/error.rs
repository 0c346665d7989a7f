//! Error types for devstage
//!
//! All modules use `DevstageResult<T>` as their return type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for devstage operations
pub type DevstageResult<T> = Result<T, DevstageError>;

/// Sub-kind carried by every artifact staging failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactErrorKind {
    /// Nothing matched the artifact pattern within the wait window
    NotFound,
    /// More than one object matched where a unique match was required
    Ambiguous,
    /// Remote list/download kept failing after the retry budget
    Transient,
    /// Archive tool exited non-zero or produced unusable output
    Extraction,
}

impl fmt::Display for ArtifactErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::Ambiguous => "ambiguous match",
            Self::Transient => "transient store failure",
            Self::Extraction => "extraction failed",
        };
        write!(f, "{}", name)
    }
}

/// All errors that can occur in devstage
#[derive(Error, Debug)]
pub enum DevstageError {
    // Artifact errors
    #[error("Artifact {artifact} failed ({kind}): {reason}")]
    Artifact {
        artifact: String,
        kind: ArtifactErrorKind,
        reason: String,
    },

    #[error("Unknown artifact: {0}")]
    UnknownArtifact(String),

    #[error("Build directory {0} exists but is not a directory")]
    BuildDirInvalid(PathBuf),

    #[error("Earlier staging of {artifact} failed: {message}")]
    StagingFailed { artifact: String, message: String },

    // Remote store errors
    #[error("Remote object not found: {0}")]
    RemoteNotFound(String),

    #[error("Remote store {operation} failed: {reason}")]
    RemoteStore { operation: String, reason: String },

    #[error("Required CLI not found: {name}. {hint}")]
    CliNotFound { name: String, hint: String },

    #[error("Invalid {kind} pattern {pattern}: {reason}")]
    PatternInvalid {
        kind: &'static str,
        pattern: String,
        reason: String,
    },

    // Build cache errors
    #[error("Invalid xbuddy path: {0}")]
    PathSpecInvalid(String),

    #[error("Unknown image alias {alias}. Use one of: {expected}")]
    AliasUnknown { alias: String, expected: String },

    #[error("Version {0} unknown, cannot resolve it in the archive")]
    VersionUnknown(String),

    #[error("No local build found: {0}")]
    LocalBuildNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Missing configuration value: {0}")]
    ConfigMissing(String),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl DevstageError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an artifact staging error
    pub fn artifact(
        artifact: impl Into<String>,
        kind: ArtifactErrorKind,
        reason: impl Into<String>,
    ) -> Self {
        Self::Artifact {
            artifact: artifact.into(),
            kind,
            reason: reason.into(),
        }
    }

    /// Create a remote store error
    pub fn remote(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RemoteStore {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Artifact sub-kind, if this is an artifact staging failure
    pub fn artifact_kind(&self) -> Option<ArtifactErrorKind> {
        match self {
            Self::Artifact { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Check if error is retryable against the remote store
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteStore { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownArtifact(_) => Some("Run: devstage artifacts"),
            Self::StagingFailed { .. } => Some("Stage the artifacts again to retry"),
            Self::LocalBuildNotFound(_) => Some("Did you run build_image?"),
            Self::ConfigMissing(_) => Some("Run: devstage config set <key> <value>"),
            Self::CliNotFound { .. } => Some("Install the Google Cloud SDK or set remote.gsutil_bin"),
            Self::Artifact {
                kind: ArtifactErrorKind::NotFound,
                ..
            } => Some("Check the archive URL; the build may still be uploading"),
            Self::Artifact {
                kind: ArtifactErrorKind::Ambiguous,
                ..
            } => Some("The artifact pattern matches several objects; stage by exact file name"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DevstageError::artifact("stateful", ArtifactErrorKind::NotFound, "no match");
        assert_eq!(
            err.to_string(),
            "Artifact stateful failed (not found): no match"
        );
    }

    #[test]
    fn error_hint() {
        let err = DevstageError::UnknownArtifact("bogus".to_string());
        assert_eq!(err.hint(), Some("Run: devstage artifacts"));
    }

    #[test]
    fn error_retryable() {
        assert!(DevstageError::remote("list", "503").is_retryable());
        assert!(!DevstageError::RemoteNotFound("gs://b/x".to_string()).is_retryable());
        assert!(!DevstageError::UnknownArtifact("x".to_string()).is_retryable());
    }

    #[test]
    fn artifact_kind_roundtrips_through_json() {
        let json = serde_json::to_string(&ArtifactErrorKind::Extraction).unwrap();
        assert_eq!(json, "\"extraction\"");
        let parsed: ArtifactErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ArtifactErrorKind::Extraction);
    }
}
