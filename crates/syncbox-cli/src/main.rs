mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "syncbox", version, about = "Local-first file sync to a remote store")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Project to operate on (defaults to the only project)
    #[arg(long, global = true)]
    project: Option<String>,

    /// Use this config file instead of ~/.syncbox/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let globals = commands::Globals {
        json: cli.json,
        project: cli.project,
        config: cli.config,
    };
    commands::run(cli.command, &globals)
}
