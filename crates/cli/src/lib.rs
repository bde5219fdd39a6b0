pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::commands::run::RunArgs;

#[derive(Debug, Parser)]
#[command(
    name = "brava",
    about = "BRAVA financial statement extraction CLI",
    long_about = "Drive the BRAVA extraction workflow, inspect configuration, and run smoke validation.",
    after_help = "Examples:\n  brava run --ticker WALMART --quarter 2\n  brava run --json\n  brava config\n  brava smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run schema detection, validation, and extraction with live progress")]
    Run {
        #[arg(long, help = "Ticker symbol (GIGANTE, WALMART, SORIANA)")]
        ticker: Option<String>,
        #[arg(long, help = "Fiscal quarter, 1 through 4")]
        quarter: Option<u8>,
        #[arg(long, help = "Fiscal year")]
        year: Option<String>,
        #[arg(long, help = "Emit one machine-readable JSON report")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config and run the workflow end to end with per-check timing")]
    Smoke,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { ticker, quarter, year, json } => {
            commands::run::run(RunArgs { ticker, quarter, year, json })
        }
        Command::Config => commands::config::run(),
        Command::Smoke => commands::smoke::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
