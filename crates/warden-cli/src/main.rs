mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::OutputFormat;
use config::WardenConfig;

/// Operational tooling for the warden delegation control plane.
#[derive(Parser)]
#[command(name = "warden", version)]
struct Cli {
    /// Operations root; config and data live under it by default.
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Explicit config file (defaults to <root>/warden.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a control-plane status snapshot.
    Dashboard,
    /// Write a configuration file interactively.
    Wizard {
        /// Skip all prompts and write the defaults.
        #[arg(long)]
        accept_defaults: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| WardenConfig::config_path(&cli.root));

    let result = match cli.command {
        Command::Dashboard => match WardenConfig::load(&config_path) {
            Ok(config) => commands::dashboard::run(&config, cli.format).await,
            Err(err) => Err(err),
        },
        Command::Wizard { accept_defaults } => {
            commands::wizard::run(&config_path, accept_defaults)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
