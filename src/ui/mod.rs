//! Terminal output helpers
//!
//! Styled with `console`; falls back to bracketed plain markers when stdout
//! is not a terminal or a CI environment is detected.

mod context;
mod output;

pub use context::UiContext;
pub use output::{
    intro, key_value, step_error_detail, step_info, step_ok, step_ok_detail, step_warn_hint,
};
