mod cli;
mod commands;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use spyprof::error::exit_code;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(spyprof_err) = e.downcast_ref::<spyprof::Error>() {
                ExitCode::from(spyprof_err.exit_code() as u8)
            } else {
                ExitCode::from(exit_code::GENERAL_ERROR as u8)
            }
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Validate CLI arguments
    cli.validate()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Invalid arguments")?;

    match cli.command {
        Command::Render {
            file,
            output,
            weighting,
        } => {
            commands::render::run(&file, &output, weighting.into())?;
        }
        Command::Top {
            file,
            clock,
            top,
            threshold,
            json,
            csv,
        } => {
            commands::top::run(&file, clock.into(), top, threshold, json, csv)?;
        }
        Command::Demo {
            duration,
            rate,
            interval,
            output,
        } => {
            commands::demo::run(duration, rate, interval, output)?;
        }
        Command::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "spyprof", &mut std::io::stdout());
        }
    }

    Ok(())
}
