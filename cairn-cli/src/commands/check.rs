//! `cairn check`

use anyhow::{Result, bail};
use cairn_stack::check_buildspecs;
use colored::*;
use std::path::Path;

use crate::config::Config;
use crate::definition::load_stack_config;

pub async fn handle_check(config: &Config, source_root: &Path) -> Result<()> {
    let stack_config = load_stack_config(config.definition()).await?;
    let report = check_buildspecs(&stack_config, source_root);

    for (project, outcome) in &report.checks {
        match outcome {
            Ok(summary) => println!(
                "  {} {} {} (version {}, phases: {})",
                "✓".green().bold(),
                project.bold(),
                summary.path.display(),
                summary.version,
                summary.phases.join(", ")
            ),
            Err(e) => println!("  {} {} {}", "✗".red().bold(), project.bold(), e),
        }
    }

    if !report.is_ok() {
        bail!(
            "{} of {} build specs failed the check",
            report.failures().count(),
            report.checks.len()
        );
    }

    println!("{}", "✓ Build specs look good".green().bold());
    Ok(())
}
