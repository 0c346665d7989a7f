//! Ls command - list the staged contents of a build

use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::error::DevstageResult;
use crate::staging::Stager;
use crate::ui::{self, UiContext};

/// Execute the ls command
pub async fn execute(args: BuildArgs, config: &Config) -> DevstageResult<()> {
    let stager = Stager::from_config(config)?;
    let location = stager.location(&args.archive_url);

    match stager.list_build_dir(&location).await? {
        Some(listing) => print!("{}", listing),
        None => {
            let ctx = UiContext::detect();
            ui::step_info(&ctx, &format!("{} is not staged", location.build_id()));
        }
    }
    Ok(())
}
