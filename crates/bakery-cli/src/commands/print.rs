//! `bakery print`: Translate Compose files and print the bake configuration.

use std::path::PathBuf;

use anyhow::Context;
use bakery_common::constants::COMPOSE_PROJECT_NAME;
use bakery_compose::env::compose_env;
use bakery_compose::{CancelFlag, ConfigDetails, ConfigFile, parse_compose_with};
use clap::Args;

use crate::output;

/// Arguments for the `print` subcommand.
#[derive(Args, Debug)]
pub struct PrintArgs {
    /// Compose file to load; repeat to merge several files in order.
    #[arg(short = 'f', long = "file", required = true)]
    pub files: Vec<PathBuf>,

    /// Directory holding the `.env` file and used to resolve includes.
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Project name, overriding the environment.
    #[arg(long, env = COMPOSE_PROJECT_NAME)]
    pub project_name: Option<String>,

    /// Write output to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Executes the `print` command.
///
/// # Errors
///
/// Returns an error if a file cannot be read, the project fails to load or
/// translate, or the output cannot be written.
pub fn execute(args: PrintArgs) -> anyhow::Result<()> {
    let workdir = super::resolve_workdir(args.workdir)?;
    tracing::info!(files = args.files.len(), workdir = %workdir.display(), "printing bake configuration");

    let files = args
        .files
        .iter()
        .map(|path| {
            let content =
                std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            Ok(ConfigFile::new(path.display().to_string(), content))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut environment = compose_env(Some(&workdir))?;
    if let Some(name) = args.project_name.filter(|n| !n.is_empty()) {
        let _ = environment.insert(COMPOSE_PROJECT_NAME.to_owned(), name);
    }

    let cancel = CancelFlag::new();
    let handle = cancel.clone();
    ctrlc::set_handler(move || handle.cancel())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let details = ConfigDetails {
        working_dir: Some(workdir),
        files,
        environment,
    };
    let config = parse_compose_with(&details, &cancel)?;
    let rendered = output::render_json(&config)?;

    if let Some(ref out_path) = args.output {
        std::fs::write(out_path, format!("{rendered}\n"))
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        tracing::info!(path = %out_path.display(), targets = config.targets.len(), "configuration written");
    } else {
        #[allow(clippy::print_stdout)]
        {
            println!("{rendered}");
        }
    }

    Ok(())
}
