//! CLI configuration
//!
//! Settings shared by every command, taken from flags or their environment
//! variable fallbacks.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    /// Lua stack definition file
    pub definition: Option<PathBuf>,

    /// Where `synth` writes the cloud assembly
    pub output_dir: PathBuf,
}

impl Config {
    pub fn new(definition: Option<PathBuf>, output_dir: PathBuf) -> Self {
        Self {
            definition,
            output_dir,
        }
    }

    pub fn definition(&self) -> Option<&Path> {
        self.definition.as_deref()
    }

    /// Validates the configuration
    ///
    /// The definition file is only checked when the command reads it.
    pub fn validate(&self, reads_definition: bool) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            bail!("output directory cannot be empty");
        }

        if let Some(definition) = self.definition.as_ref().filter(|_| reads_definition) {
            let metadata = std::fs::metadata(definition)
                .with_context(|| format!("Stack definition {} not found", definition.display()))?;
            if !metadata.is_file() {
                bail!("Stack definition {} is not a file", definition.display());
            }
        }

        Ok(())
    }
}
