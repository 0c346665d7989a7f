//! CLI command implementations

pub mod artifacts;
pub mod config;
pub mod error;
pub mod is_staged;
pub mod ls;
pub mod stage;
pub mod xbuddy;

pub use artifacts::execute as artifacts;
pub use config::execute as config;
pub use error::execute as error;
pub use is_staged::execute as is_staged;
pub use ls::execute as ls;
pub use stage::execute as stage;
pub use xbuddy::execute as xbuddy;
