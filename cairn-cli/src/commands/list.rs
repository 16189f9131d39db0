//! `cairn list`

use anyhow::{Context, Result};
use cairn_core::domain::template::Template;
use cairn_stack::ApplicationStack;
use colored::*;

use crate::config::Config;
use crate::definition::load_stack_config;

pub async fn handle_list(config: &Config) -> Result<()> {
    let stack_config = load_stack_config(config.definition()).await?;
    let stack = ApplicationStack::synthesize(&stack_config)
        .with_context(|| format!("Failed to synthesize {}", stack_config.stack_name))?;

    println!("{} {}", "Stack".bold(), stack.name.cyan());
    println!("{:<40} {:<32} {}", "PATH", "TYPE", "LOGICAL ID");
    for (path, resource_type, logical_id) in rows(&stack.template) {
        println!("{:<40} {:<32} {}", path, resource_type, logical_id.dimmed());
    }

    if !stack.template.parameters.is_empty() {
        println!();
        println!("{}", "Parameters".bold());
        for (name, parameter) in &stack.template.parameters {
            println!("  {} ({})", name, parameter.parameter_type);
        }
    }

    println!();
    println!("{}", "Outputs".bold());
    for name in stack.template.outputs.keys() {
        println!("  {}", name);
    }

    Ok(())
}

/// `(path, type, logical id)` per resource, sorted by path
fn rows(template: &Template) -> Vec<(String, String, String)> {
    let mut rows: Vec<_> = template
        .resources
        .iter()
        .map(|(logical_id, resource)| {
            (
                resource.path().unwrap_or(logical_id.as_str()).to_string(),
                resource.resource_type.clone(),
                logical_id.clone(),
            )
        })
        .collect();
    rows.sort();
    rows
}
