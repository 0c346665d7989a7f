//! Local staging state
//!
//! Everything the stager keeps on disk next to staged files, plus the
//! in-process locks that serialize access to it.
//!
//! # Artifact States
//!
//! | State | On disk | Description |
//! |-------|---------|-------------|
//! | Unstaged | no marker | Never staged, or marker invalidated |
//! | Staging | no marker, artifact lock held | Download or extraction in progress |
//! | Staged | marker listing produced files | Every listed file exists |
//! | Failed | error record in `<build_dir>.errors/` | Last attempt failed |
//!
//! A marker whose listed files have gone missing is deleted on the next
//! check, moving the artifact back to Unstaged.

pub mod error_record;
pub mod lock;
pub mod marker;

pub use error_record::{ErrorRecord, ErrorStore};
pub use lock::{ArtifactGuard, BuildExclusiveGuard, BuildSharedGuard, LockRegistry};
pub use marker::{marker_name, path_exists, sanitize, Marker};
