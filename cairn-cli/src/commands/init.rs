//! `cairn init`
//!
//! Writes a starter `stack.lua` carrying the production defaults, plus a
//! `.luarc.json` and module stubs so the Lua language server can check it.

use anyhow::{Context, Result, bail};
use cairn_lua::{EnvModule, LogLevel, LogModule, LogSink, ModuleRegistry, STACK_STUBS, VarProvider};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};

const STACK_LUA: &str = r#"-- Cairn stack definition
--
-- Every field is optional; anything left out keeps the production default.
-- Synthesize with: cairn --definition stack.lua synth

return stack.define {
    name = "ApplicationProduction",
    region = env.get("CDK_DEFAULT_REGION", "us-east-2"),
    account = env.get("CDK_DEFAULT_ACCOUNT"),

    registry = "application-repo",
    pipeline = "application-pipeline",

    source = {
        owner = "HiHashoom",
        repo = "application",
        branch = "main",
        secret = "github",
    },

    cluster = {
        id = "application-cluster",
        version = "1.23",
        admin_role = "eks-application-role",
        -- subnets = stack.subnets("subnet-aaaa", "subnet-bbbb"),
    },

    build = stack.project("DockerBuild", "build-pipeline.yml"),
    deploy = stack.project("Deploy", "deploy-pipeline.yml"),
}
"#;

const LUARC_JSON: &str = r#"{
  "$schema": "https://raw.githubusercontent.com/sumneko/vscode-lua/master/setting/schema.json",
  "runtime": {
    "version": "Lua 5.4"
  },
  "diagnostics": {
    "globals": ["stack", "log", "env"]
  },
  "workspace": {
    "library": [".cairn/stubs"],
    "checkThirdParty": false
  }
}
"#;

pub async fn handle_init(dir: &Path, force: bool) -> Result<()> {
    let written = write_project_files(dir, force)?;

    println!("{}", "✓ Stack definition initialized".green().bold());
    for path in written {
        println!("  {} {}", "Created".green(), path.display());
    }
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Edit {} to match your deployment", "stack.lua".cyan());
    println!(
        "  2. Run {}",
        "cairn --definition stack.lua synth".cyan()
    );

    Ok(())
}

fn write_project_files(dir: &Path, force: bool) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let stack_lua = dir.join("stack.lua");
    if stack_lua.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            stack_lua.display()
        );
    }

    let mut written = Vec::new();
    write_file(&stack_lua, STACK_LUA, &mut written)?;
    write_file(&dir.join(".luarc.json"), LUARC_JSON, &mut written)?;

    let stubs_dir = dir.join(".cairn").join("stubs");
    fs::create_dir_all(&stubs_dir)
        .with_context(|| format!("Failed to create stubs directory {}", stubs_dir.display()))?;

    write_file(&stubs_dir.join("stack.lua"), STACK_STUBS, &mut written)?;
    for module in stub_modules().modules() {
        let path = stubs_dir.join(format!("{}.lua", module.id()));
        write_file(&path, &module.stubs(), &mut written)?;
    }

    Ok(written)
}

fn write_file(path: &Path, contents: &str, written: &mut Vec<PathBuf>) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    written.push(path.to_path_buf());
    Ok(())
}

/// The definition modules, backed by no-op providers
///
/// Stub generation only needs the module text.
fn stub_modules() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(EnvModule::new(NoOpVarProvider));
    registry.register(LogModule::new(NoOpLogSink));
    registry
}

struct NoOpLogSink;

impl LogSink for NoOpLogSink {
    fn write(&mut self, _level: LogLevel, _message: &str) {}
}

struct NoOpVarProvider;

impl VarProvider for NoOpVarProvider {
    fn get(&self, _name: &str) -> Option<String> {
        None
    }

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::domain::config::StackConfig;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_files() {
        let dir = TempDir::new().unwrap();
        let written = write_project_files(dir.path(), false).unwrap();

        assert_eq!(written.len(), 5);
        for stub in ["stack.lua", "log.lua", "env.lua"] {
            assert!(dir.path().join(".cairn/stubs").join(stub).is_file());
        }
        assert!(dir.path().join(".luarc.json").is_file());
    }

    #[test]
    fn test_stubs_cover_definition_modules() {
        let ids = |registry: &ModuleRegistry| -> Vec<&'static str> {
            registry.modules().iter().map(|m| m.id()).collect()
        };
        assert_eq!(
            ids(&stub_modules()),
            ids(&crate::definition::definition_modules())
        );
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        write_project_files(dir.path(), false).unwrap();

        assert!(write_project_files(dir.path(), false).is_err());
        assert!(write_project_files(dir.path(), true).is_ok());
    }

    #[tokio::test]
    async fn test_starter_definition_matches_defaults() {
        let dir = TempDir::new().unwrap();
        write_project_files(dir.path(), false).unwrap();

        let mut config = crate::definition::load_stack_config(Some(&dir.path().join("stack.lua")))
            .await
            .unwrap();
        // region and account follow the environment
        config.env = StackConfig::default().env;
        assert_eq!(config, StackConfig::default());
    }
}
