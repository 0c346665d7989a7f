//! Artifacts command - list the registered artifact names

use crate::artifact::ArtifactSpec;
use crate::cli::args::{ArtifactsArgs, OutputFormat};
use crate::config::Config;
use crate::error::DevstageResult;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the artifacts command
pub async fn execute(args: ArtifactsArgs, _config: &Config) -> DevstageResult<()> {
    let specs = ArtifactSpec::registered();

    match args.format {
        OutputFormat::Table => print_table(&specs),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&specs)?),
        OutputFormat::Plain => {
            for spec in &specs {
                println!("{}", spec.name);
            }
        }
    }
    Ok(())
}

fn print_table(specs: &[ArtifactSpec]) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "Artifacts");

    println!(
        "{:<28} {:<8} {}",
        style("NAME").bold(),
        style("KIND").bold(),
        style("PATTERN").bold()
    );
    println!("{}", "-".repeat(77));

    for spec in specs {
        let pattern = match &spec.rename_to {
            Some(to) => format!("{} -> {}", spec.pattern, to),
            None => spec.pattern.clone(),
        };
        println!("{:<28} {:<8} {}", spec.name, spec.kind.to_string(), pattern);
    }

    println!();
    println!("{} artifact(s)", specs.len());
}
