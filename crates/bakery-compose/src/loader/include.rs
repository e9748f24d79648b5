//! `include` resolution.
//!
//! Included files are read through a [`ResourceLoader`] so that callers can
//! serve them from somewhere other than the local filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use bakery_common::error::{BakeError, Result};
use serde_yaml::Value;

/// Reads the bytes of an included Compose file.
pub trait ResourceLoader {
    /// Returns the content of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be read.
    fn load(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Reads included files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalResources;

impl ResourceLoader for LocalResources {
    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|source| BakeError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Removes the `include` section from `doc` and returns its entries, each
/// entry being the list of paths merged together for that include.
pub(super) fn take_entries(doc: &mut Value) -> Result<Vec<Vec<String>>> {
    let Some(root) = doc.as_mapping_mut() else {
        return Ok(Vec::new());
    };
    let Some(section) = root.remove("include") else {
        return Ok(Vec::new());
    };
    let Value::Sequence(entries) = section else {
        return Ok(Vec::new());
    };
    entries.into_iter().map(entry_paths).collect()
}

fn entry_paths(entry: Value) -> Result<Vec<String>> {
    let invalid = |message: &str| BakeError::Validation {
        message: format!("include: {message}"),
    };
    match entry {
        Value::String(path) => Ok(vec![path]),
        Value::Mapping(mut long) => match long.remove("path") {
            Some(Value::String(path)) => Ok(vec![path]),
            Some(Value::Sequence(paths)) => paths
                .into_iter()
                .map(|p| match p {
                    Value::String(s) => Ok(s),
                    _ => Err(invalid("path entries must be strings")),
                })
                .collect(),
            _ => Err(invalid("path must be a string or a list of strings")),
        },
        _ => Err(invalid("entries must be strings or mappings")),
    }
}

/// Resolves an include path against the directory of the including file.
pub(super) fn resolve(base_dir: &Path, path: &str) -> Result<PathBuf> {
    let joined = base_dir.join(path);
    std::path::absolute(&joined).map_err(|source| BakeError::Io {
        path: joined,
        source,
    })
}
