//! Stack definition loading
//!
//! Reads an optional Lua definition and turns it into a `StackConfig`.
//! Definitions see a filtered view of the process environment and their
//! `log.*` calls go to tracing.

use anyhow::{Context, Result};
use cairn_core::domain::config::StackConfig;
use cairn_lua::{EnvModule, LogLevel, LogModule, LogSink, ModuleRegistry, VarProvider, parse_stack_definition};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Only these variables are visible to definitions
const VISIBLE_PREFIXES: [&str; 2] = ["CAIRN_", "CDK_"];

/// Process environment, restricted to `VISIBLE_PREFIXES`
pub struct ProcessVars;

impl ProcessVars {
    fn visible(name: &str) -> bool {
        VISIBLE_PREFIXES.iter().any(|p| name.starts_with(p))
    }
}

impl VarProvider for ProcessVars {
    fn get(&self, name: &str) -> Option<String> {
        if !Self::visible(name) {
            return None;
        }
        std::env::var(name).ok()
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .map(|(k, _)| k)
            .filter(|k| Self::visible(k))
            .collect()
    }
}

/// Forwards definition messages to tracing
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!(target: "cairn::definition", "{}", message),
            LogLevel::Info => info!(target: "cairn::definition", "{}", message),
            LogLevel::Warning => warn!(target: "cairn::definition", "{}", message),
            LogLevel::Error => error!(target: "cairn::definition", "{}", message),
        }
    }
}

/// Modules available to definition files
pub fn definition_modules() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(EnvModule::new(ProcessVars));
    registry.register(LogModule::new(TracingSink));
    registry
}

/// Load the stack configuration
///
/// # Arguments
/// * `path` - Lua definition file, or `None` for the production defaults
pub async fn load_stack_config(path: Option<&Path>) -> Result<StackConfig> {
    let Some(path) = path else {
        debug!("No stack definition given, using defaults");
        return Ok(StackConfig::default());
    };

    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read stack definition {}", path.display()))?;

    let config = parse_stack_definition(&source, &path.display().to_string(), &definition_modules())
        .with_context(|| format!("Invalid stack definition {}", path.display()))?;

    info!("Loaded stack definition {} ({})", path.display(), config.stack_name);
    Ok(config)
}
