//! Environment resolution for Compose interpolation.
//!
//! The environment is the process environment, completed with the entries of
//! a `.env` file in the working directory. Process variables always win.

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::Path;

use bakery_common::constants::DOTENV_FILE;
use bakery_common::error::{BakeError, Result};

/// A resolved set of environment variables.
pub type Environment = BTreeMap<String, String>;

/// Turns `KEY=VALUE` entries into a map.
///
/// Entries without `=` are ignored. Later duplicates win.
pub fn environ_to_map<I, S>(entries: I) -> Environment
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .filter_map(|entry| {
            entry
                .as_ref()
                .split_once('=')
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
        })
        .collect()
}

/// Snapshot of the current process environment.
///
/// Variables whose name or value is not valid UTF-8 are skipped.
pub fn process_environment() -> Environment {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Completes `current` with the entries of `<working_dir>/.env`.
///
/// Keys already present in `current` are kept. A missing file leaves the
/// environment unchanged.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_dot_env(mut current: Environment, working_dir: &Path) -> Result<Environment> {
    let joined = working_dir.join(DOTENV_FILE);
    let path = std::path::absolute(&joined).map_err(|source| BakeError::Io {
        path: joined.clone(),
        source,
    })?;

    match std::fs::metadata(&path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(current),
        Err(source) => return Err(BakeError::Io { path, source }),
        Ok(_) => {}
    }

    let data = std::fs::read(&path).map_err(|source| BakeError::Io {
        path: path.clone(),
        source,
    })?;

    // Entries of `current` go first so that `${VAR}` in the file can see them.
    let seed = seed_entries(&current);
    let mut parsed = Vec::new();
    for item in dotenvy::from_read_iter(seed.as_bytes().chain(data.as_slice())) {
        let pair = item.map_err(|e| BakeError::DotEnv {
            path: path.clone(),
            message: e.to_string(),
        })?;
        parsed.push(pair);
    }
    tracing::debug!(path = %path.display(), entries = parsed.len(), "loaded dotenv file");

    for (key, value) in parsed {
        if current.contains_key(&key) {
            continue;
        }
        let _ = current.insert(key, value);
    }
    Ok(current)
}

/// Renders `env` as double-quoted dotenv lines.
///
/// Names dotenv cannot express are left out; they cannot be referenced from
/// a `.env` file anyway.
fn seed_entries(env: &Environment) -> String {
    let mut out = String::new();
    for (key, value) in env.iter().filter(|(k, _)| is_dotenv_key(k)) {
        out.push_str(key);
        out.push_str("=\"");
        for c in value.chars() {
            match c {
                '\\' | '"' | '$' => {
                    out.push('\\');
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                _ => out.push(c),
            }
        }
        out.push_str("\"\n");
    }
    out
}

fn is_dotenv_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Resolves the environment used to load Compose files.
///
/// # Errors
///
/// Returns an error if the `.env` file exists but cannot be read or parsed.
pub fn compose_env(working_dir: Option<&Path>) -> Result<Environment> {
    let env = process_environment();
    match working_dir {
        Some(dir) => load_dot_env(env, dir),
        None => Ok(env),
    }
}
