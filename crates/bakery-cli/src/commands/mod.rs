//! CLI command definitions and dispatch.

pub mod print;
pub mod validate;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

/// Bakery: Compose files to bake build targets.
#[derive(Parser, Debug)]
#[command(name = "bakery", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Translate Compose files and print the bake configuration as JSON.
    Print(print::PrintArgs),
    /// Check files one by one and report which ones are valid Compose files.
    Validate(validate::ValidateArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Print(args) => print::execute(args),
        Command::Validate(args) => validate::execute(args),
    }
}

/// Returns `workdir`, defaulting to the current directory.
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined.
pub fn resolve_workdir(workdir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match workdir {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("failed to determine the working directory"),
    }
}
