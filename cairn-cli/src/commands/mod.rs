//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod check;
mod init;
mod list;
mod synth;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize the stack into the cloud assembly directory
    Synth {
        /// Print the template to stdout instead of writing files
        #[arg(long)]
        stdout: bool,
    },
    /// Check that the build-spec files exist and are well formed
    Check {
        /// Directory the build-spec paths are relative to
        #[arg(short, long, default_value = ".")]
        source_root: PathBuf,
    },
    /// List the resources the stack declares
    List,
    /// Write a starter stack definition and Lua editor support files
    Init {
        /// Directory to write into
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Overwrite an existing stack.lua
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Whether the command loads the stack definition
    pub fn reads_definition(&self) -> bool {
        !matches!(self, Commands::Init { .. })
    }
}

/// Route a command to its handler
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Synth { stdout } => synth::handle_synth(config, stdout).await,
        Commands::Check { source_root } => check::handle_check(config, &source_root).await,
        Commands::List => list::handle_list(config).await,
        Commands::Init { dir, force } => init::handle_init(&dir, force).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_does_not_read_definition() {
        let init = Commands::Init {
            dir: PathBuf::from("."),
            force: false,
        };
        assert!(!init.reads_definition());
        assert!(Commands::Synth { stdout: false }.reads_definition());
        assert!(Commands::List.reads_definition());
    }
}
