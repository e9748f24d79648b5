//! Per-file validation of Compose documents.
//!
//! A single file of a multi-file project may be partial, so cross-reference
//! checks are left to the full load.

use std::path::Path;

use bakery_common::config::LoadOptions;
use bakery_common::error::Result;

use crate::env::{Environment, compose_env};
use crate::loader::{self, ConfigDetails, ConfigFile};

/// How a file name is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Compose,
    Other,
    Unknown,
}

fn file_kind(filename: &str) -> FileKind {
    let lower = filename.to_lowercase();
    if lower.ends_with(".yml") || lower.ends_with(".yaml") {
        FileKind::Compose
    } else if lower.ends_with(".json") || lower.ends_with(".hcl") {
        FileKind::Other
    } else {
        FileKind::Unknown
    }
}

/// Validates one file, resolving the environment from the process and `working_dir`.
///
/// Returns whether the file is a Compose file together with the validation
/// outcome:
/// - `.yml`/`.yaml`: `(true, result)`.
/// - `.json`/`.hcl`: `(false, Ok(()))`, the file is not inspected.
/// - anything else: `(result.is_ok(), result)`.
///
/// A failure to resolve the environment yields `(true, Err(..))`.
pub fn validate_compose_file(
    content: &[u8],
    filename: &str,
    working_dir: Option<&Path>,
) -> (bool, Result<()>) {
    match compose_env(working_dir) {
        Ok(environment) => validate_compose_with_env(content, filename, environment),
        Err(e) => (true, Err(e)),
    }
}

/// Like [`validate_compose_file`] with an explicit environment.
pub fn validate_compose_with_env(
    content: &[u8],
    filename: &str,
    environment: Environment,
) -> (bool, Result<()>) {
    let kind = file_kind(filename);
    tracing::debug!(file = filename, ?kind, "validating file");
    match kind {
        FileKind::Other => (false, Ok(())),
        FileKind::Compose => (true, validate_compose(content, filename, environment)),
        FileKind::Unknown => {
            let result = validate_compose(content, filename, environment);
            (result.is_ok(), result)
        }
    }
}

fn validate_compose(content: &[u8], filename: &str, environment: Environment) -> Result<()> {
    let details = ConfigDetails {
        working_dir: None,
        files: vec![ConfigFile::new(filename, content)],
        environment,
    };
    let _ = loader::load(&details, &LoadOptions::for_validation())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(content: &str, filename: &str) -> (bool, Result<()>) {
        validate_compose_with_env(content.as_bytes(), filename, Environment::new())
    }

    #[test]
    fn yaml_files_are_compose() {
        let (is_compose, result) = validate("services:\n  web:\n    build: .\n", "compose.YML");
        assert!(is_compose);
        assert!(result.is_ok());
    }

    #[test]
    fn yaml_errors_are_reported() {
        let (is_compose, result) = validate("services:\n  web:\n    bild: .\n", "compose.yaml");
        assert!(is_compose);
        assert!(result.is_err());
    }

    #[test]
    fn json_and_hcl_are_skipped() {
        assert!(matches!(validate("not yaml: [", "docker-bake.json"), (false, Ok(()))));
        assert!(matches!(validate("target \"a\" {}", "docker-bake.HCL"), (false, Ok(()))));
    }

    #[test]
    fn unknown_extensions_are_tried_as_compose() {
        let (ok, result) = validate("services:\n  web:\n    image: nginx\n", "Composefile");
        assert!(ok);
        assert!(result.is_ok());

        let (ok, result) = validate("target \"default\" {}\n", "Bakefile");
        assert!(!ok);
        assert!(result.is_err());
    }

    #[test]
    fn partial_files_validate() {
        let (_, result) = validate(
            "services:\n  web:\n    build:\n      secrets: [undeclared]\n",
            "override.yml",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn dotenv_of_working_dir_feeds_interpolation() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(".env"), "BAKERY_VALIDATE_REQUIRED=.\n").expect("write .env");
        let yaml = b"services:\n  web:\n    build: ${BAKERY_VALIDATE_REQUIRED:?must be set}\n";

        let (is_compose, result) = validate_compose_file(yaml, "c.yml", Some(dir.path()));
        assert!(is_compose);
        assert!(result.is_ok(), "got: {result:?}");

        let (_, result) = validate_compose_with_env(yaml, "c.yml", Environment::new());
        assert!(result.is_err());
    }

    #[test]
    fn unreadable_dotenv_is_an_environment_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join(".env")).expect("mkdir");
        let (is_compose, result) = validate_compose_file(b"services: {}\n", "c.yml", Some(dir.path()));
        assert!(is_compose);
        assert!(result.is_err());
    }
}
