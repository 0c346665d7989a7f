//! CLI argument definitions using clap derive

use clap::{ArgAction, ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// devstage - build artifact staging and caching
///
/// Stages build artifacts from an archive into a local static directory
/// and keeps a bounded cache of recently used builds.
#[derive(Parser, Debug)]
#[command(name = "devstage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DEVSTAGE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stage artifacts of a build
    Stage(StageArgs),

    /// Check whether artifacts are staged
    IsStaged(BuildArtifactsArgs),

    /// List the staged contents of a build
    Ls(BuildArgs),

    /// Show the last recorded staging error of an artifact
    Error(ErrorArgs),

    /// Fetch images through the build cache
    Xbuddy(XbuddyArgs),

    /// List registered artifact names
    Artifacts(ArtifactsArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Identifies one build in the archive
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Archive URL of the build (gs://bucket/<board>-<suffix>/<version> or a local path)
    #[arg(short, long)]
    pub archive_url: String,
}

/// A build and a selection of its artifacts
#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("selection").required(true).multiple(true).args(["artifacts", "files"])))]
pub struct BuildArtifactsArgs {
    #[command(flatten)]
    pub build: BuildArgs,

    /// Registered artifact names (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub artifacts: Vec<String>,

    /// Raw file names in the archive (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub files: Vec<String>,
}

/// Arguments for the stage command
#[derive(Parser, Debug)]
pub struct StageArgs {
    #[command(flatten)]
    pub target: BuildArtifactsArgs,

    /// Stage in the background and report results as they finish
    #[arg(short, long)]
    pub background: bool,
}

/// Arguments for the error command
#[derive(Parser, Debug)]
pub struct ErrorArgs {
    #[command(flatten)]
    pub build: BuildArgs,

    /// Artifact or file name
    #[arg(long)]
    pub artifact: String,
}

/// Arguments for the artifacts command
#[derive(Parser, Debug)]
pub struct ArtifactsArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the xbuddy command
#[derive(Parser, Debug)]
pub struct XbuddyArgs {
    /// Subcommand for xbuddy
    #[command(subcommand)]
    pub action: XbuddyAction,
}

/// xbuddy subcommands
#[derive(Subcommand, Debug)]
pub enum XbuddyAction {
    /// Resolve a path (board[/version[/alias]]) and stage it if needed
    Get {
        /// xbuddy path, e.g. x86-alex/latest/test
        path: String,

        /// Print the build directory instead of the file
        #[arg(long)]
        return_dir: bool,
    },

    /// List cached builds, most recently used first
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the number of builds kept in the cache
    Capacity,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., xbuddy.capacity)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_stage() {
        let cli = Cli::parse_from([
            "devstage",
            "stage",
            "--archive-url",
            "gs://chromeos-image-archive/x86-alex-release/R26-4000.0.0",
            "--artifacts",
            "full_payload,stateful",
            "--files",
            "debug.tgz",
        ]);
        match cli.command {
            Commands::Stage(args) => {
                assert_eq!(args.target.artifacts, vec!["full_payload", "stateful"]);
                assert_eq!(args.target.files, vec!["debug.tgz"]);
                assert!(!args.background);
            }
            _ => panic!("expected Stage command"),
        }
    }

    #[test]
    fn cli_parses_is_staged() {
        let cli = Cli::parse_from([
            "devstage",
            "is-staged",
            "-a",
            "/archive/b/R1-1.0.0",
            "--files",
            "stateful.tgz",
        ]);
        match cli.command {
            Commands::IsStaged(args) => {
                assert_eq!(args.build.archive_url, "/archive/b/R1-1.0.0");
                assert!(args.artifacts.is_empty());
                assert_eq!(args.files, vec!["stateful.tgz"]);
            }
            _ => panic!("expected IsStaged command"),
        }
    }

    #[test]
    fn cli_parses_xbuddy_get() {
        let cli = Cli::parse_from(["devstage", "-vv", "xbuddy", "get", "x86-alex/latest", "--return-dir"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Xbuddy(XbuddyArgs {
                action: XbuddyAction::Get { path, return_dir },
            }) => {
                assert_eq!(path, "x86-alex/latest");
                assert!(return_dir);
            }
            _ => panic!("expected xbuddy get"),
        }
    }

    #[test]
    fn cli_parses_config_init() {
        let cli = Cli::parse_from(["devstage", "config", "init", "--force"]);
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs {
                action: Some(ConfigAction::Init { force: true })
            })
        ));
    }

    #[test]
    fn cli_requires_archive_url() {
        assert!(Cli::try_parse_from(["devstage", "ls"]).is_err());
    }

    #[test]
    fn cli_requires_a_selection() {
        assert!(Cli::try_parse_from(["devstage", "stage", "-a", "/archive/b/R1-1.0.0"]).is_err());
    }
}
