//! Is-staged command - check markers without touching the archive

use crate::cli::args::BuildArtifactsArgs;
use crate::config::Config;
use crate::error::{DevstageError, DevstageResult};
use crate::staging::Stager;

/// Execute the is-staged command
pub async fn execute(args: BuildArtifactsArgs, config: &Config) -> DevstageResult<()> {
    let stager = Stager::from_config(config)?;
    let location = stager.location(&args.build.archive_url);

    for name in args.artifacts.iter().chain(&args.files) {
        if let Some(record) = stager.get_error(&location, name).await? {
            return Err(DevstageError::StagingFailed {
                artifact: record.artifact,
                message: record.message,
            });
        }
    }

    let staged = stager
        .is_staged(&location, &args.artifacts, &args.files)
        .await?;
    println!("{}", staged);
    Ok(())
}
