//! devstage - build artifact staging and caching
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use devstage::cli::{commands, Cli, Commands};
use devstage::config::{Config, ConfigManager};
use devstage::error::DevstageResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> DevstageResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Using config {}", config_manager.path().display());

    // Config editing must work even when the static dir is unusable
    if let Commands::Config(args) = cli.command {
        return commands::config(args, &config, &config_manager).await;
    }

    ConfigManager::ensure_state_dirs(&config).await?;

    match cli.command {
        Commands::Stage(args) => commands::stage(args, &config).await,
        Commands::IsStaged(args) => commands::is_staged(args, &config).await,
        Commands::Ls(args) => commands::ls(args, &config).await,
        Commands::Error(args) => commands::error(args, &config).await,
        Commands::Xbuddy(args) => commands::xbuddy(args, &config).await,
        Commands::Artifacts(args) => commands::artifacts(args, &config).await,
        Commands::Config(args) => commands::config(args, &config, &config_manager).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug. `RUST_LOG` overrides the level.
fn init_logging(verbose: u8, config: &Config) {
    let default = match verbose {
        0 => "devstage=warn",
        1 => "devstage=info",
        _ => "devstage=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}
