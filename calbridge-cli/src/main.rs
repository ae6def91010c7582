mod commands;
mod render;
mod settings;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "calbridge")]
#[command(about = "Translate host calendar items to iCalendar event groups and back")]
struct Cli {
    /// Settings file (defaults to $CALBRIDGE_CONFIG or ~/.config/calbridge/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log mapping details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map a host item (JSON) to an .ics event group
    Push {
        /// Host item as JSON
        item: PathBuf,

        /// Event group currently stored remotely, to keep its UID and sequence
        #[arg(long)]
        existing: Option<PathBuf>,

        /// Write the .ics here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Apply an .ics event group to a host item (JSON)
    Pull {
        /// Remote event group
        ics: PathBuf,

        /// Host item to update; a new item is created when omitted
        #[arg(long)]
        item: Option<PathBuf>,

        /// Write the updated item here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show or create the settings file
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,calbridge=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = match cli.config {
        Some(path) => path,
        None => Settings::config_path()?,
    };

    match cli.command {
        Commands::Push {
            item,
            existing,
            output,
        } => {
            let settings = Settings::load(&config_path)?;
            commands::push::run(&settings, &item, existing.as_deref(), output.as_deref()).await
        }
        Commands::Pull { ics, item, output } => {
            let settings = Settings::load(&config_path)?;
            commands::pull::run(&settings, &ics, item.as_deref(), output.as_deref()).await
        }
        Commands::Config { action } => match action {
            None => commands::config::show(&config_path),
            Some(ConfigAction::Init { force }) => commands::config::init(&config_path, force),
        },
    }
}
