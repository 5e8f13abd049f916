//! Anvil CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

mod buildtools;
mod commands;
mod config;
mod download;
mod handlers;
mod logging;
mod pipeline;
mod tail;
mod workdir;

#[cfg(test)]
mod config_tests;

use commands::Commands;
use config::CliConfig;
use workdir::WorkDir;

#[derive(Parser)]
#[command(name = "anvil")]
#[command(author, version, about = "Build Spigot versions in parallel with an SFTP artifact cache", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Working directory, wiped at the start of every build
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if tracing::dispatcher::has_been_set() {
                error!("{}", e);
            } else {
                eprintln!("{}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anvil_core::Result<()> {
    let mut config = CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build(args) => {
            config.apply_build_args(&args);
            let workdir = WorkDir::reset(cli.workdir.unwrap_or_else(WorkDir::default_base))?;
            logging::init(Some(&workdir.app_log()))?;
            handlers::build(&config, args.force, workdir).await
        }
        Commands::Plan(args) => {
            config.apply_version_args(&args);
            logging::init(None)?;
            handlers::plan(&config).await
        }
    }
}
