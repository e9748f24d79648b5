//! Formatted output helpers for CLI commands.
//!
//! Renders the bake configuration as JSON and validation results as
//! colored status lines.

use bakery_common::error::Result;
use bakery_common::types::Config;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Renders a configuration as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`bakery_common::error::BakeError::Serialization`] if the configuration cannot be serialized.
pub fn render_json(config: &Config) -> Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

/// Formats the outcome of validating one file.
#[must_use]
pub fn validation_line(name: &str, is_compose: bool, result: &Result<()>) -> String {
    match (is_compose, result) {
        (_, Err(e)) => format!("  {RED}✗{RESET} {name}: {e}"),
        (true, Ok(())) => format!("  {GREEN}✓{RESET} {name}"),
        (false, Ok(())) => format!("  {DIM}-{RESET} {name} {DIM}(not a compose file){RESET}"),
    }
}
