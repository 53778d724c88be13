// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use reqpin::config::Config;
use std::path::Path;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn run(cli: &Cli) -> Result<i32> {
    let config = Config::discover(cli.config.as_deref(), Path::new("."))?;
    match &cli.command {
        Commands::Compile(args) => commands::cmd_compile(args, &config),
        Commands::Sync(args) => commands::cmd_sync(args, &config),
    }
}

/// Exit status for a failed run: engine errors carry their own code
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<reqpin::Error>())
        .map(reqpin::Error::exit_code)
        .unwrap_or(1)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            exit_code(&err)
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
