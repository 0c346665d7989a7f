//! devstage - build artifact staging and caching
//!
//! Stages named artifacts of a build from a remote archive into a local
//! static directory, once per artifact no matter how many callers ask, and
//! keeps a bounded LRU cache of recently requested builds.

pub mod artifact;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod staging;
pub mod store;
pub mod ui;
pub mod xbuddy;

pub use error::{DevstageError, DevstageResult};
