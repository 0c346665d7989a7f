//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::schema::RemoteBackend;
use crate::config::{Config, ConfigManager};
use crate::error::{DevstageError, DevstageResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;

const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "storage.static_dir",
    "remote.backend",
    "remote.gsutil_bin",
    "remote.local_root",
    "remote.max_attempts",
    "remote.initial_backoff_ms",
    "staging.wait_timeout_secs",
    "staging.no_wait_timeout_secs",
    "staging.poll_interval_secs",
    "xbuddy.capacity",
    "xbuddy.manage_builds",
    "xbuddy.images_dir",
    "xbuddy.image_archive",
    "xbuddy.release_archive",
];

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
) -> DevstageResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let mut updated = config.clone();
            apply_value(&mut updated, &key, &value)?;
            manager.save(&updated).await?;
            let ctx = UiContext::detect();
            ui::step_ok(&ctx, &format!("Set {} = {}", key, value));
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> DevstageResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> DevstageResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    Ok(())
}

/// Set a dot-separated key on `config`
fn apply_value(config: &mut Config, key: &str, value: &str) -> DevstageResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => match value {
            "text" | "json" => config.general.log_format = value.to_string(),
            _ => {
                return Err(DevstageError::User(format!(
                    "Invalid log format: {}. Use text/json",
                    value
                )))
            }
        },

        ["storage", "static_dir"] => config.storage.static_dir = PathBuf::from(value),

        ["remote", "backend"] => {
            config.remote.backend = match value {
                "gsutil" => RemoteBackend::Gsutil,
                "local" => RemoteBackend::Local,
                _ => {
                    return Err(DevstageError::User(format!(
                        "Invalid backend: {}. Use gsutil/local",
                        value
                    )))
                }
            }
        }
        ["remote", "gsutil_bin"] => config.remote.gsutil_bin = value.to_string(),
        ["remote", "local_root"] => config.remote.local_root = optional_path(value),
        ["remote", "max_attempts"] => config.remote.max_attempts = parse_number(value)?,
        ["remote", "initial_backoff_ms"] => config.remote.initial_backoff_ms = parse_number(value)?,

        ["staging", "wait_timeout_secs"] => config.staging.wait_timeout_secs = parse_number(value)?,
        ["staging", "no_wait_timeout_secs"] => {
            config.staging.no_wait_timeout_secs = parse_number(value)?
        }
        ["staging", "poll_interval_secs"] => {
            config.staging.poll_interval_secs = parse_number(value)?
        }

        ["xbuddy", "capacity"] => config.xbuddy.capacity = parse_number(value)?,
        ["xbuddy", "manage_builds"] => config.xbuddy.manage_builds = parse_bool(value)?,
        ["xbuddy", "images_dir"] => config.xbuddy.images_dir = optional_path(value),
        ["xbuddy", "image_archive"] => config.xbuddy.image_archive = value.to_string(),
        ["xbuddy", "release_archive"] => config.xbuddy.release_archive = value.to_string(),

        _ => {
            return Err(DevstageError::User(format!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                VALID_KEYS.join(", ")
            )))
        }
    }

    Ok(())
}

fn optional_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}

fn parse_bool(value: &str) -> DevstageResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(DevstageError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> DevstageResult<T> {
    value
        .parse()
        .map_err(|_| DevstageError::User(format!("Invalid number: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_known_keys() {
        let mut config = Config::default();
        apply_value(&mut config, "xbuddy.capacity", "12").unwrap();
        apply_value(&mut config, "xbuddy.manage_builds", "yes").unwrap();
        apply_value(&mut config, "remote.backend", "local").unwrap();
        apply_value(&mut config, "remote.local_root", "/srv/archive").unwrap();

        assert_eq!(config.xbuddy.capacity, 12);
        assert!(config.xbuddy.manage_builds);
        assert_eq!(config.remote.backend, RemoteBackend::Local);
        assert_eq!(config.remote.local_root, Some(PathBuf::from("/srv/archive")));

        apply_value(&mut config, "remote.local_root", "").unwrap();
        assert_eq!(config.remote.local_root, None);
    }

    #[test]
    fn reject_unknown_key_and_bad_values() {
        let mut config = Config::default();
        assert!(matches!(
            apply_value(&mut config, "vm.name", "x"),
            Err(DevstageError::User(_))
        ));
        assert!(apply_value(&mut config, "xbuddy.capacity", "many").is_err());
        assert!(apply_value(&mut config, "remote.backend", "s3").is_err());
        assert!(apply_value(&mut config, "general.log_format", "xml").is_err());
        assert_eq!(config.xbuddy.capacity, 5);
    }

    #[test]
    fn every_listed_key_is_settable() {
        for key in VALID_KEYS {
            let value = match *key {
                "remote.backend" => "local",
                "general.log_format" => "json",
                "xbuddy.manage_builds" => "false",
                k if k.ends_with("_secs")
                    || k.ends_with("_ms")
                    || k.ends_with("attempts")
                    || k.ends_with("capacity") =>
                {
                    "3"
                }
                _ => "/tmp/value",
            };
            let mut config = Config::default();
            apply_value(&mut config, key, value).unwrap();
        }
    }
}
