//! # bakery-compose
//!
//! Translates Compose projects into bake build targets.
//!
//! Handles:
//! - **Env**: process environment merged with the project's `.env` file.
//! - **Loader**: parsing, interpolation, include and merge of Compose files.
//! - **Validate**: per-file validation, deciding which files are Compose files.
//! - **Extension**: the `x-bake` build extension.
//! - **Translate**: services with a `build` block become targets.
//! - **Units**: byte sizes and ulimits.

pub mod env;
pub mod extension;
pub mod loader;
pub mod translate;
pub mod units;
pub mod validate;

pub use loader::{CancelFlag, ConfigDetails, ConfigFile, Project};
pub use translate::{parse_compose, parse_compose_files, parse_compose_with, translate};
pub use validate::{validate_compose_file, validate_compose_with_env};
