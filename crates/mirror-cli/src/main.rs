mod cli;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use mirror_core::config::loader::load_config;
use mirror_core::observability::{init_stderr_tracing, set_log_level};

use cli::{Cli, Commands};
use output::print_error;

fn main() {
    if let Err(e) = run() {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    init_stderr_tracing(cli.log_level.as_deref().unwrap_or("warn"));
    let cfg = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.log_level.is_none() {
        set_log_level(&cfg.logging.level);
    }

    match &cli.command {
        Commands::Config => {
            commands::config::show(&cfg, cli.config.as_deref(), format)?;
        }
        Commands::Demo(args) => {
            let settings = commands::device_settings(&cfg.device, args);
            commands::demo::run(&settings, format)?;
        }
        Commands::Categories(args) => {
            let settings = commands::device_settings(&cfg.device, args);
            commands::categories::run(&settings, format)?;
        }
    }

    Ok(())
}
