//! `cairn synth`

use anyhow::{Context, Result};
use cairn_core::CloudAssembly;
use cairn_stack::synthesize_assembly;
use colored::*;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Config;
use crate::definition::load_stack_config;

pub async fn handle_synth(config: &Config, stdout: bool) -> Result<()> {
    let stack_config = load_stack_config(config.definition()).await?;
    let assembly = synthesize_assembly(&stack_config)
        .with_context(|| format!("Failed to synthesize {}", stack_config.stack_name))?;

    if stdout {
        for stack in assembly.stacks() {
            print!("{}", stack.template.to_json_string()?);
        }
        return Ok(());
    }

    let written = write_assembly(&assembly, &config.output_dir).await?;

    println!(
        "{} {}",
        "✓ Synthesized".green().bold(),
        stack_config.stack_name.bold()
    );
    for path in written {
        println!("  {} {}", "Wrote".green(), path.display());
    }

    Ok(())
}

/// Write every assembly file below `output_dir`, creating it if needed
pub async fn write_assembly(assembly: &CloudAssembly, output_dir: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut written = Vec::new();
    for file in assembly.files()? {
        let path = output_dir.join(&file.relative_path);
        tokio::fs::write(&path, file.contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::domain::config::StackConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_assembly() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("cdk.out");
        let assembly = synthesize_assembly(&StackConfig::default()).unwrap();

        let written = write_assembly(&assembly, &out).await.unwrap();
        assert_eq!(written.len(), 2);
        assert!(out.join("ApplicationProduction.template.json").is_file());

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("manifest.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["version"], serde_json::json!("36.0.0"));
    }

    #[tokio::test]
    async fn test_rewrite_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let assembly = synthesize_assembly(&StackConfig::default()).unwrap();
        let template = dir.path().join("ApplicationProduction.template.json");

        write_assembly(&assembly, dir.path()).await.unwrap();
        let first = std::fs::read(&template).unwrap();

        let again = synthesize_assembly(&StackConfig::default()).unwrap();
        write_assembly(&again, dir.path()).await.unwrap();
        assert_eq!(first, std::fs::read(&template).unwrap());
    }
}
