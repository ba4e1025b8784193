mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod progress;
mod render;
mod resource;
mod runner;
mod state;
mod sudo;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Manifest;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Release(args) => {
            let manifest = Manifest::load(cli.manifest.as_deref())?;
            commands::release::run(&ctx, &manifest, args.deploy_dir)
        }
        Command::Apply(args) => {
            let manifest = Manifest::load(cli.manifest.as_deref())?;
            commands::activate::apply(&ctx, &manifest, args.dry_run, args.yes)
        }
        Command::Diff => {
            let manifest = Manifest::load(cli.manifest.as_deref())?;
            commands::activate::diff(&ctx, &manifest)
        }
        Command::Status => {
            let manifest = Manifest::load(cli.manifest.as_deref())?;
            commands::activate::status(&ctx, &manifest)
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "capstan", &mut io::stdout());
            Ok(())
        }
    }
}
