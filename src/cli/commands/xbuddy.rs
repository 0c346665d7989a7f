//! Xbuddy command - fetch images through the bounded build cache

use crate::cli::args::{OutputFormat, XbuddyAction, XbuddyArgs};
use crate::config::Config;
use crate::error::DevstageResult;
use crate::staging::{JobStatus, Stager};
use crate::ui::{self, UiContext};
use crate::xbuddy::{BuildCache, CacheEntry};
use chrono::{DateTime, Utc};
use console::style;
use std::sync::Arc;
use tracing::{debug, warn};

/// Execute the xbuddy command
pub async fn execute(args: XbuddyArgs, config: &Config) -> DevstageResult<()> {
    let stager = Arc::new(Stager::from_config(config)?);
    let cache = BuildCache::new(stager.clone(), config.xbuddy.clone());

    match args.action {
        XbuddyAction::Get { path, return_dir } => {
            let local = cache.get(&path, return_dir).await?;
            println!("{}", local.display());
            finish_prefetch(&stager).await;
        }
        XbuddyAction::List { format } => {
            let entries = cache.list().await?;
            match format {
                OutputFormat::Table => print_table(&entries),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
                OutputFormat::Plain => {
                    for entry in &entries {
                        println!("{}", entry.build_id);
                    }
                }
            }
        }
        XbuddyAction::Capacity => println!("{}", cache.capacity()),
    }
    Ok(())
}

/// Wait for prefetch staging scheduled by `get`; the runtime drops
/// unfinished tasks on exit.
async fn finish_prefetch(stager: &Stager) {
    while let Some(job) = stager.next_background_result().await {
        match job.status {
            JobStatus::Failed => warn!(
                "Prefetch of {} failed: {}",
                job.artifact,
                job.error.as_deref().unwrap_or("no detail")
            ),
            _ => debug!("Prefetched {}", job.artifact),
        }
    }
}

fn print_table(entries: &[CacheEntry]) {
    let ctx = UiContext::detect();
    if entries.is_empty() {
        ui::step_info(&ctx, "No cached builds");
        return;
    }

    ui::intro(&ctx, "Cached builds");
    println!(
        "{:<50} {}",
        style("BUILD").bold(),
        style("LAST ACCESS").bold()
    );
    println!("{}", "-".repeat(70));

    let now = Utc::now();
    for entry in entries {
        println!("{:<50} {}", entry.build_id, format_age(entry.last_access, now));
    }

    println!();
    println!("{} build(s)", entries.len());
}

fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(at);
    if age.num_days() > 0 {
        format!("{}d ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{}h ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{}m ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn age_picks_largest_unit() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::days(3), now), "3d ago");
        assert_eq!(format_age(now - Duration::minutes(90), now), "1h ago");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_age(now, now), "just now");
    }
}
