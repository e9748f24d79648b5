//! `bakery validate`: Check files one by one.

use std::path::PathBuf;

use anyhow::Context;
use bakery_compose::validate_compose_file;
use clap::Args;

use crate::output;

/// Arguments for the `validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Files to check.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Directory holding the `.env` file.
    #[arg(long)]
    pub workdir: Option<PathBuf>,
}

/// Executes the `validate` command.
///
/// # Errors
///
/// Returns an error if a file cannot be read or any file fails validation.
pub fn execute(args: ValidateArgs) -> anyhow::Result<()> {
    let workdir = super::resolve_workdir(args.workdir)?;
    tracing::info!(files = args.files.len(), workdir = %workdir.display(), "validating files");

    let mut failures = 0usize;
    for path in &args.files {
        let content =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let name = path.display().to_string();
        let (is_compose, result) = validate_compose_file(&content, &name, Some(&workdir));
        if result.is_err() {
            failures += 1;
        }
        #[allow(clippy::print_stderr)]
        {
            eprintln!("{}", output::validation_line(&name, is_compose, &result));
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} file(s) failed validation", args.files.len());
    }
    Ok(())
}
