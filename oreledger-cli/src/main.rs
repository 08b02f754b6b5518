use std::path::PathBuf;

use clap::{Parser, Subcommand};
use oreledger_storage::StorageSettings;

mod commands;

use commands::{CliError, run_migrate, run_player, run_status, run_top};

#[derive(Parser, Debug)]
#[command(name = "oreledger", version)]
#[command(about = "OreLedger storage maintenance")]
struct Cli {
    /// Storage settings file
    #[arg(long, global = true, default_value = "storage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create missing tables and apply pending schema upgrades
    Migrate,
    /// Show backend, schema versions and pool occupancy
    Status,
    /// Look up one player by UUID or last known name
    Player {
        /// UUID or name
        query: String,
    },
    /// Print a page of the leaderboard
    Top {
        #[arg(long, default_value_t = 10)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings = StorageSettings::from_file(&cli.config)?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Migrate => run_migrate(&settings, &mut out),
        Commands::Status => run_status(&settings, &mut out),
        Commands::Player { query } => run_player(&settings, &query, &mut out),
        Commands::Top { limit, offset } => run_top(&settings, limit, offset, &mut out),
    }
}

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}
