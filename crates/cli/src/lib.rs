pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "procure",
    about = "Purchase order approval operator CLI",
    long_about = "Operate the procurement approval service: migrations, demo directory seeding, config inspection, readiness checks, and approval ledger inspection.",
    after_help = "Examples:\n  procure doctor --json\n  procure config\n  procure ledger PO-3f2a9c"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo department registry and user directory (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Validate config, database connectivity, migrations, and the approval registry")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print an order's approval chain as JSON")]
    Ledger {
        #[arg(help = "Purchase order id")]
        order_id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Ledger { order_id } => commands::ledger::run(&order_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
