//! # smp CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use smp_cli::cert::{run_cert, CertArgs};
use smp_cli::exchange::{run_export, run_import, ExportArgs, ImportArgs};
use smp_cli::migration::{run_migration, MigrationArgs};
use smp_cli::sml::{run_sml, SmlArgs};

/// SMP administration CLI
///
/// Works directly on the file-backed data directory of an SMP: XML export
/// and import, certificate inspection and SMP registration at the SML.
#[derive(Parser, Debug)]
#[command(name = "smp", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory of the SMP stores.
    #[arg(long, global = true, default_value = "smp-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write service groups, service information, redirects and business cards as XML.
    Export(ExportArgs),

    /// Import an exchange XML file.
    Import(ImportArgs),

    /// Certificate inspection.
    Cert(CertArgs),

    /// SMP registration at the SML.
    Sml(SmlArgs),

    /// Participant migration between SMPs.
    Migration(MigrationArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level.
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::debug!(data_dir = %cli.data_dir.display(), "smp CLI starting");

    let result = match cli.command {
        Commands::Export(args) => run_export(&args, &cli.data_dir),
        Commands::Import(args) => run_import(&args, &cli.data_dir),
        Commands::Cert(args) => run_cert(&args),
        Commands::Sml(args) => run_sml(&args, &cli.data_dir),
        Commands::Migration(args) => run_migration(&args, &cli.data_dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
