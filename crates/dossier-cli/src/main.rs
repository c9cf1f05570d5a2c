//! `dossier`: analyze documents or a topic from the command line.

mod cli;
mod commands;

use clap::Parser;

fn main() {
    let cli = cli::Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    if let Err(e) = dossier::init_tracing_with_filter(cli.log_format, default_filter) {
        eprintln!("dossier: logging unavailable: {}", e);
    }

    if let Err(error) = commands::run(cli) {
        eprintln!("dossier error: {error:#}");
        std::process::exit(1);
    }
}
