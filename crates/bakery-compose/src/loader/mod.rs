//! Compose loader.
//!
//! Turns one or more Compose documents into a [`Project`]:
//! - **Parsing**: YAML documents with merge keys (`<<`).
//! - **Interpolation**: `${VAR}` substitution against the project environment.
//! - **Schema**: structural checks of each document.
//! - **Include**: `include` entries, resolved through a [`ResourceLoader`].
//! - **Merge**: later files override earlier ones.
//! - **Model**: typed decode, profiles, normalization, consistency checks.

pub mod include;
pub mod merge;
pub mod model;
pub mod schema;
pub mod template;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bakery_common::config::LoadOptions;
use bakery_common::error::{BakeError, Result};
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use crate::env::Environment;
pub use include::{LocalResources, ResourceLoader};
use model::{ComposeFile, SecretConfig, ServiceConfig};

/// A Compose document given by name and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Name used in error messages and to resolve includes.
    pub filename: String,
    /// Raw YAML bytes.
    pub content: Vec<u8>,
}

impl ConfigFile {
    /// Creates a config file from its name and content.
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Everything the loader needs to build a project.
#[derive(Debug, Clone, Default)]
pub struct ConfigDetails {
    /// Directory relative paths are resolved against.
    pub working_dir: Option<PathBuf>,
    /// Documents, merged in order.
    pub files: Vec<ConfigFile>,
    /// Variables available to interpolation.
    pub environment: Environment,
}

/// A loaded Compose project.
#[derive(Debug, Clone, Default)]
pub struct Project {
    /// Project name.
    pub name: String,
    /// Working directory, if one was given.
    pub working_dir: Option<PathBuf>,
    /// Active services in order of first appearance.
    pub services: IndexMap<String, ServiceConfig>,
    /// Project environment.
    pub environment: Environment,
    /// Project-level secret definitions.
    pub secrets: IndexMap<String, SecretConfig>,
}

/// Shared flag used to abandon a load in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a flag that is not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether the flag has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`BakeError::Cancelled`] once the flag has been raised.
    ///
    /// # Errors
    ///
    /// Returns [`BakeError::Cancelled`] if the flag is raised.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(BakeError::Cancelled);
        }
        Ok(())
    }
}

/// Loads a project, reading included files from the local filesystem.
///
/// # Errors
///
/// Returns an error if any document fails to parse, interpolate, validate or
/// merge, or if the merged project is inconsistent.
pub fn load(details: &ConfigDetails, options: &LoadOptions) -> Result<Project> {
    load_with(details, options, &LocalResources, &CancelFlag::new())
}

/// Loads a project with an explicit resource loader and cancel flag.
///
/// # Errors
///
/// See [`load`]. Also returns [`BakeError::Cancelled`] when `cancel` is raised
/// before the load completes.
pub fn load_with(
    details: &ConfigDetails,
    options: &LoadOptions,
    resources: &dyn ResourceLoader,
    cancel: &CancelFlag,
) -> Result<Project> {
    tracing::info!(files = details.files.len(), "loading compose project");
    if details.files.is_empty() {
        return Err(BakeError::Load {
            message: "no compose file given".to_owned(),
        });
    }

    let base_dir = details.working_dir.clone().unwrap_or_default();
    let mut pipeline = Pipeline {
        environment: &details.environment,
        resources,
        cancel,
        stack: Vec::new(),
    };

    let mut merged = Value::Mapping(Mapping::new());
    for file in &details.files {
        let path = include::resolve(&base_dir, &file.filename)?;
        pipeline.stack.push(path);
        let doc = pipeline.process(&file.filename, &file.content, &base_dir)?;
        let _ = pipeline.stack.pop();
        merge::merge_documents(&mut merged, doc);
    }
    cancel.check()?;

    let compose: ComposeFile = serde_yaml::from_value(merged)?;
    let project = build_project(compose, details, options)?;
    tracing::debug!(
        project = %project.name,
        services = project.services.len(),
        "compose project loaded"
    );
    Ok(project)
}

/// Per-document processing shared by top-level and included files.
struct Pipeline<'a> {
    environment: &'a Environment,
    resources: &'a dyn ResourceLoader,
    cancel: &'a CancelFlag,
    /// Files currently being processed, outermost first.
    stack: Vec<PathBuf>,
}

impl Pipeline<'_> {
    fn process(&mut self, filename: &str, content: &[u8], base_dir: &Path) -> Result<Value> {
        self.cancel.check()?;
        tracing::debug!(file = filename, "processing compose document");

        let mut doc = parse_document(filename, content)?;
        template::interpolate_document(&mut doc, self.environment)?;
        schema::validate(&doc)?;
        merge::normalize_shapes(&mut doc);

        let entries = include::take_entries(&mut doc)?;
        if entries.is_empty() {
            return Ok(doc);
        }

        let mut included = Value::Mapping(Mapping::new());
        for paths in entries {
            for path in paths {
                let resolved = include::resolve(base_dir, &path)?;
                self.enter(&resolved)?;
                let bytes = self.resources.load(&resolved)?;
                let dir = resolved.parent().map(Path::to_path_buf).unwrap_or_default();
                let name = resolved.display().to_string();
                let doc = self.process(&name, &bytes, &dir)?;
                let _ = self.stack.pop();
                merge::merge_documents(&mut included, doc);
            }
        }

        let imported = merge::service_names(&included);
        if let Some(conflict) = merge::service_names(&doc)
            .into_iter()
            .find(|name| imported.contains(name))
        {
            return Err(BakeError::Load {
                message: format!(
                    "{filename}: services.{conflict} conflicts with imported resource"
                ),
            });
        }
        merge::merge_documents(&mut included, doc);
        Ok(included)
    }

    fn enter(&mut self, path: &Path) -> Result<()> {
        if self.stack.iter().any(|p| p == path) {
            let chain = self
                .stack
                .iter()
                .map(|p| p.display().to_string())
                .chain(std::iter::once(path.display().to_string()))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(BakeError::Load {
                message: format!("include cycle detected: {chain}"),
            });
        }
        self.stack.push(path.to_path_buf());
        Ok(())
    }
}

fn parse_document(filename: &str, content: &[u8]) -> Result<Value> {
    let empty = || BakeError::Load {
        message: format!("{filename}: empty compose file"),
    };
    if content.iter().all(u8::is_ascii_whitespace) {
        return Err(empty());
    }
    let mut doc: Value = serde_yaml::from_slice(content).map_err(|e| BakeError::Load {
        message: format!("{filename}: {e}"),
    })?;
    if doc.is_null() {
        return Err(empty());
    }
    doc.apply_merge().map_err(|e| BakeError::Load {
        message: format!("{filename}: {e}"),
    })?;
    Ok(doc)
}

fn build_project(
    compose: ComposeFile,
    details: &ConfigDetails,
    options: &LoadOptions,
) -> Result<Project> {
    let ComposeFile {
        name,
        services,
        mut secrets,
    } = compose;

    for (key, secret) in &mut secrets {
        if secret.name.is_none() {
            secret.name = Some(key.clone());
        }
    }

    // Dependencies may name services that profiles later disable.
    let declared: Vec<String> = services.keys().cloned().collect();
    let services: IndexMap<String, ServiceConfig> = services
        .into_iter()
        .map(|(key, mut service)| {
            service.name.clone_from(&key);
            (key, service)
        })
        .filter(|(key, service)| {
            let active = options.is_active(&service.profiles);
            if !active {
                tracing::debug!(service = %key, "service disabled by profiles");
            }
            active
        })
        .collect();

    let mut project = Project {
        name: name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| options.project_name.clone()),
        working_dir: details.working_dir.clone(),
        services,
        environment: details.environment.clone(),
        secrets,
    };

    if !options.skip_normalization {
        normalize(&mut project);
    }
    if !options.skip_consistency_check {
        check_consistency(&project, &declared)?;
    }
    Ok(project)
}

/// Applies Compose defaults to build blocks.
fn normalize(project: &mut Project) {
    for service in project.services.values_mut() {
        let Some(build) = service.build.as_mut() else {
            continue;
        };
        if build.context.is_empty() {
            ".".clone_into(&mut build.context);
        }
        if build.dockerfile.is_empty() && build.dockerfile_inline.is_empty() {
            "Dockerfile".clone_into(&mut build.dockerfile);
        }
        match &project.working_dir {
            Some(dir) if is_local_path(&build.context) => {
                build.context = dir.join(&build.context).display().to_string();
            }
            _ => {}
        }
    }
}

/// Returns whether a build context names a relative directory on disk.
fn is_local_path(context: &str) -> bool {
    !(context.contains("://") || context.starts_with("git@") || Path::new(context).is_absolute())
}

/// Checks cross references that single documents cannot verify.
fn check_consistency(project: &Project, declared: &[String]) -> Result<()> {
    for service in project.services.values() {
        if service.image.is_none() && service.build.is_none() {
            return Err(BakeError::Validation {
                message: format!(
                    "service \"{}\" has neither an image nor a build context specified",
                    service.name
                ),
            });
        }
        let secrets = service.build.iter().flat_map(|b| &b.secrets);
        for secret in secrets {
            if !project.secrets.contains_key(&secret.source) {
                return Err(BakeError::Validation {
                    message: format!(
                        "service \"{}\" refers to undefined build secret {}",
                        service.name, secret.source
                    ),
                });
            }
        }
        for secret in &service.secrets {
            if !project.secrets.contains_key(&secret.source) {
                return Err(BakeError::Validation {
                    message: format!(
                        "service \"{}\" refers to undefined secret {}",
                        service.name, secret.source
                    ),
                });
            }
        }
        for (dependency, required) in &service.depends_on {
            if *required && !declared.contains(dependency) {
                return Err(BakeError::Validation {
                    message: format!(
                        "service \"{}\" depends on undefined service \"{dependency}\"",
                        service.name
                    ),
                });
            }
        }
    }
    Ok(())
}
