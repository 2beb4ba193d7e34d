pub mod report;
pub mod shutdown;
pub mod track;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use track::{TrackCommand, process_track_command};
use tracing::level_filters::LevelFilter;

use crate::{config::TrackingConfig, utils::logging::enable_logging};

#[derive(Parser, Debug)]
#[command(name = "focus-tracker", version, long_about = None)]
#[command(about = "Tracks which application holds your focus during a work session", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Print logs to the console")]
    log: bool,
    #[arg(long = "log-filter", help = "Log level, defaults to RUST_LOG or info")]
    log_filter: Option<LevelFilter>,
    #[arg(long = "log-dir", help = "Also write daily rotated log files into this directory")]
    log_dir: Option<PathBuf>,
    #[arg(long, short, help = "JSON configuration file. Defaults are used when omitted")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Track the focused application until the duration elapses or Ctrl-C")]
    Track {
        #[command(flatten)]
        command: TrackCommand,
    },
    #[command(about = "Print the effective configuration")]
    Config {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = args
        .log_filter
        .or_else(|| args.log.then_some(LevelFilter::DEBUG));
    enable_logging(args.log_dir.as_deref(), logging_level, args.log)?;

    let config = match &args.config {
        Some(path) => TrackingConfig::load(path)?,
        None => TrackingConfig::default(),
    };

    match args.commands {
        Commands::Track { command } => process_track_command(config, command).await,
        Commands::Config {} => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod cli_tests {
    use clap::CommandFactory;

    use super::Args;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }
}
