//! bitforge CLI - FPGA build pipelines for vendor toolchains

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("bitforge=debug")
    } else {
        EnvFilter::new("bitforge=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let global = commands::GlobalArgs {
        config: cli.config,
        yes: cli.yes,
        verbose: cli.verbose,
    };

    // Execute command
    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &global),
        Commands::Clean(args) => commands::clean::execute(args, &global),
        Commands::Scan(args) => commands::scan::execute(args, &global),
        Commands::Script(args) => commands::script::execute(args, &global),
        Commands::Gui(args) => commands::gui::execute(args, &global),
        Commands::Program(args) => commands::program::execute(args, &global),
        Commands::Backend(args) => commands::backend::execute(args, &global),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
