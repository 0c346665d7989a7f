//! Stage command - download and unpack artifacts of a build

use crate::cli::args::StageArgs;
use crate::config::Config;
use crate::error::DevstageResult;
use crate::staging::{JobStatus, Stager};
use crate::ui::{self, UiContext};

/// Execute the stage command
pub async fn execute(args: StageArgs, config: &Config) -> DevstageResult<()> {
    let ctx = UiContext::detect();
    let stager = Stager::from_config(config)?;
    let target = args.target;
    let location = stager.location(&target.build.archive_url);

    ui::intro(&ctx, &format!("Staging {}", location.build_id()));

    let outcome = stager
        .stage(&location, &target.artifacts, &target.files, args.background)
        .await?;

    for staged in &outcome.staged {
        let detail = if staged.fresh {
            format!("{} file(s)", staged.files.len())
        } else {
            "already staged".to_string()
        };
        ui::step_ok_detail(&ctx, &staged.name, &detail);
    }
    for job in &outcome.scheduled {
        ui::step_info(&ctx, &format!("{} scheduled in the background", job.artifact));
    }

    // Background tasks die with the runtime, so wait for them here.
    while let Some(job) = stager.next_background_result().await {
        match job.status {
            JobStatus::Failed => ui::step_warn_hint(
                &ctx,
                &format!("{} failed in the background", job.artifact),
                job.error.as_deref().unwrap_or("no detail"),
            ),
            _ => ui::step_ok_detail(&ctx, &job.artifact, "staged in the background"),
        }
    }

    ui::key_value(&ctx, "Build dir", &location.build_dir.display().to_string());
    Ok(())
}
