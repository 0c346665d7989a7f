//! Error command - show the recorded failure of an artifact

use crate::cli::args::ErrorArgs;
use crate::config::Config;
use crate::error::DevstageResult;
use crate::staging::Stager;
use crate::ui::{self, UiContext};

/// Execute the error command
pub async fn execute(args: ErrorArgs, config: &Config) -> DevstageResult<()> {
    let ctx = UiContext::detect();
    let stager = Stager::from_config(config)?;
    let location = stager.location(&args.build.archive_url);

    let Some(record) = stager.get_error(&location, &args.artifact).await? else {
        ui::step_info(&ctx, &format!("No error recorded for {}", args.artifact));
        return Ok(());
    };

    ui::step_error_detail(&ctx, &record.artifact, &record.message);
    if let Some(kind) = record.kind {
        ui::key_value(&ctx, "Kind", &kind.to_string());
    }
    ui::key_value(
        &ctx,
        "Recorded",
        &record.recorded_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    Ok(())
}
