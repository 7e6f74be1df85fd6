//! Merger binary.
//!
//! Loads configuration, initializes tracing and runs one command against the configured
//! source and target tables: a merge, a dry-run preview, column mapping maintenance or the
//! control-table migrations.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use config::Environment;
use config::shared::MergerConfig;
use telemetry::init_tracing;
use tracing::{error, info};

use crate::error::MergerResult;
use crate::settings::load_merger_config;

mod core;
mod error;
mod settings;

/// Merges a source snapshot table into its slowly changing dimension target.
#[derive(Parser, Debug)]
#[command(name = "merger", version)]
#[command(about = "Merges a source snapshot into its SCD type 2 target table")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive the target, then insert new, terminate vanished and insert changed rows.
    Run,
    /// Classify source and target rows without writing anything.
    Preview {
        /// Print every new, changed and terminated record.
        #[arg(long)]
        rows: bool,
    },
    /// Store a source to target column mapping for the configured tables.
    Map {
        #[arg(long)]
        source_column: String,
        /// Target column, an empty value marks the source column as ignored.
        #[arg(long)]
        target_column: String,
    },
    /// List the stored column mappings for the configured tables.
    Mappings,
    /// Create or upgrade the control tables.
    Migrate,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Run => "run",
            Command::Preview { .. } => "preview",
            Command::Map { .. } => "map",
            Command::Mappings => "mappings",
            Command::Migrate => "migrate",
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    match start(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn start(args: Args) -> MergerResult<()> {
    let merger_config = load_merger_config()?;
    let environment = Environment::load()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"), environment)?;
    info!(command = args.command.name(), environment = %environment, "starting merger");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(args.command, merger_config))
}

async fn async_main(command: Command, merger_config: MergerConfig) -> MergerResult<()> {
    match command {
        Command::Run => core::run_merge(merger_config).await,
        Command::Preview { rows } => core::preview_merge(merger_config, rows).await,
        Command::Map {
            source_column,
            target_column,
        } => core::upsert_mapping(merger_config, source_column, target_column).await,
        Command::Mappings => core::list_mappings(merger_config).await,
        Command::Migrate => core::migrate(merger_config).await,
    }
}
