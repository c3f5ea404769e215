//! # Insuree import CLI (`insurees`)
//!
//! Batch jobs for the insuree registry: create the database, import
//! civil-registration exports, move households onto the new location
//! hierarchy, and print a summary of what is stored.
//!
//! ## Usage
//!
//! ```bash
//! insurees --config ./config/insurees.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `insurees init` | Create the SQLite database and schema |
//! | `insurees import <csv>` | Import a delimited export using an import profile |
//! | `insurees clean-locations` | Re-link households to mapped villages |
//! | `insurees stats` | Show counts of persons, households and mappings |
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Completed clean |
//! | 1 | Fatal error before or outside row processing |
//! | 2 | Completed, but some rows or households failed |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use insuree_import::{config, import, migrate, repair, stats};

/// Batch import and cleanup of civil-registration insuree records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/insurees.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "insurees", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/insurees.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it on an existing database changes nothing.
    Init,

    /// Import insurees from a delimited text file.
    ///
    /// Each row is validated, located and then created or updated. A bad
    /// row is reported and skipped; the remaining rows are still imported.
    Import {
        /// Path to the input file.
        csv: PathBuf,

        /// Import profile name (defaults to `[import].profile`).
        #[arg(long)]
        profile: Option<String>,
    },

    /// Move households from the old location hierarchy to mapped villages.
    CleanLocations {
        /// Compute the counters without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show database statistics.
    Stats,
}

const EXIT_ROW_ERRORS: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_ROW_ERRORS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run one command. `Ok(false)` means it finished with per-row failures.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            Ok(true)
        }
        Commands::Import { csv, profile } => {
            let summary = import::run_import(&cfg, &csv, profile.as_deref()).await?;
            Ok(summary.is_clean())
        }
        Commands::CleanLocations { dry_run } => {
            let summary = repair::run_clean_locations(&cfg, dry_run).await?;
            Ok(summary.is_clean())
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
            Ok(true)
        }
    }
}
