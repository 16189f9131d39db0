//! Cairn CLI
//!
//! Synthesizes the application deployment stack into a cloud assembly and
//! offers a few helpers around it.

mod commands;
mod config;
mod definition;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cairn")]
#[command(about = "Cluster, registry and deployment pipeline as code", long_about = None)]
struct Cli {
    /// Lua stack definition; the production defaults are used when absent
    #[arg(short, long, env = "CAIRN_DEFINITION")]
    definition: Option<PathBuf>,

    /// Cloud assembly directory
    #[arg(short, long, env = "CAIRN_OUTDIR", default_value = "cdk.out")]
    output: PathBuf,

    /// Defaults to `synth` when omitted
    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cairn=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Synth { stdout: false });

    let config = Config::new(cli.definition, cli.output);
    config.validate(command.reads_definition())?;

    handle_command(command, &config).await
}
