pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "rosterbot",
    about = "Rosterbot operator CLI",
    long_about = "Inspect configuration, check readiness, and query the subscriber sheet \
                  the bot serves.",
    after_help = "Examples:\n  rosterbot doctor --json\n  rosterbot inspect --building A\n  \
                  rosterbot search A 1 12\n  rosterbot lookup A 1 12"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, bot token, dataset and access list readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Summarize buildings, blocks and record counts in the dataset")]
    Inspect {
        #[arg(long, help = "Only report this building")]
        building: Option<String>,
    },
    #[command(about = "Look up subscribers by unit number or name within a building and block")]
    Search {
        building: String,
        block: String,
        term: String,
        #[arg(long, help = "Maximum number of results (defaults to search.max_results)")]
        limit: Option<usize>,
    },
    #[command(about = "Fetch the records stored under one exact building_block_unit key")]
    Lookup { building: String, block: String, unit: String },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Inspect { building } => commands::inspect::run(building.as_deref()),
        Command::Search { building, block, term, limit } => {
            commands::search::run(&building, &block, &term, limit)
        }
        Command::Lookup { building, block, unit } => {
            commands::lookup::run(&building, &block, &unit)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
