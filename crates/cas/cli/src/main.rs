//! `smartcas`: command-line interface for conditional-access smart card readers

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use smartcas_transport_pcsc::PcscDeviceManager;

mod commands;
mod config;

use commands::*;

#[derive(Parser)]
#[command(version, about = "Smart card reader for pay-TV conditional access")]
struct Cli {
    /// Configuration file (defaults to ~/.smartcas/smartcas.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reader name to use (overrides the configured device)
    #[arg(short, long)]
    reader: Option<String>,

    /// Trace level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers
    List,

    /// Poll the card and log insertions and removals
    Watch,

    /// Activate the card and show its identity
    Identify,

    /// Decode an archived binary EMM
    Inspect {
        /// Archived `.emm` file
        file: PathBuf,
    },

    /// Send an archived binary EMM to the card
    Replay {
        /// Archived `.emm` file
        file: PathBuf,
    },
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = config::load_config(cli.config.as_deref())?.reader;
    if let Some(reader) = cli.reader {
        config.device = Some(reader);
    }

    match cli.command {
        Commands::Inspect { file } => inspect_command(&file),
        Commands::List => list_readers(&PcscDeviceManager::new()?),
        Commands::Watch => {
            let reader = open_reader(&PcscDeviceManager::new()?, &config)?;
            watch_command(&reader, &config)
        }
        Commands::Identify => {
            let reader = open_reader(&PcscDeviceManager::new()?, &config)?;
            identify_command(&reader)
        }
        Commands::Replay { file } => {
            let reader = open_reader(&PcscDeviceManager::new()?, &config)?;
            identify_command(&reader)?;
            replay_command(&reader, &file)
        }
    }
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("trace")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .init();
}
