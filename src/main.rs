//! codegreen-instrument CLI entry point.

use clap::Parser;
use codegreen_instrument::cli::{self, Cli, Commands, EXIT_ERROR};
use codegreen_instrument::logging;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.log_level) {
        eprintln!("Error: {}", e);
        std::process::exit(EXIT_ERROR);
    }

    let result = match &cli.command {
        Commands::Instrument(args) => cli::run_instrument(args),
        Commands::Analyze(args) => cli::run_analyze(args),
        Commands::Languages => cli::run_languages(),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}
