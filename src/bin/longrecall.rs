//! longrecall - long-context recall benchmark CLI.
//!
//! Exit codes:
//! - `0` success
//! - `2` invalid argument combination or configuration
//! - `3` question set failed the validation pre-check
//! - `4` source document too short for a requested context length
//! - `1` anything else

use std::process::ExitCode;

use clap::Parser;

use longrecall::cli::commands;
use longrecall::cli::parser::{Cli, Commands};
use longrecall::Error;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let outcome = match &cli.command {
        Commands::Test(args) => commands::test::run(args),
        Commands::Heatmap(args) => commands::heatmap::run(args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(error: &Error) -> u8 {
    match error {
        Error::InvalidArgument(_) | Error::Config(_) => 2,
        Error::Precheck(_) => 3,
        Error::InsufficientSource(_) => 4,
        _ => 1,
    }
}
