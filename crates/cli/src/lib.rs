pub mod commands;

use clap::{Parser, Subcommand};
use freightdesk_core::config::{AppConfig, LoadOptions};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "freightdesk",
    about = "Freightdesk operator CLI",
    long_about = "Operate the freightdesk ledger: migrations, config inspection, readiness checks, and the dual-ledger reconciliation sweep.",
    after_help = "Examples:\n  freightdesk doctor --json\n  freightdesk config\n  freightdesk reconcile"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, carrier credentials, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Sweep the ledger for dual-write pairs that are missing a side")]
    Reconcile,
}

fn init_logging() {
    use freightdesk_core::config::LogFormat::*;
    use tracing::Level;

    // Commands re-load and validate config themselves; logging init is
    // best-effort so a broken config still produces a diagnosable run.
    let Ok(config) = AppConfig::load(LoadOptions::default()) else {
        tracing_subscriber::fmt().with_target(false).compact().init();
        return;
    };
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Reconcile => commands::reconcile::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
