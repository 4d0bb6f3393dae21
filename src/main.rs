mod cli;
mod commands;
mod engine;
mod model;
mod store;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve(args) => commands::resolve::run(args),
        Commands::Coalesce(args) => commands::coalesce::run(args),
        Commands::Checkout(args) => commands::checkout::run(args),
        Commands::Save(args) => commands::save::run(args),
        Commands::SelectPd(args) => commands::save::run_select_pd(args),
        Commands::Forget(args) => commands::save::run_forget(args),
        Commands::Status(args) => commands::status::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
