//! Translation of a loaded Compose project into bake targets.
//!
//! Every service with a `build` block becomes one target. Targets are emitted
//! in service order and collected in the `default` group.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use bakery_common::config::LoadOptions;
use bakery_common::constants::DEFAULT_GROUP;
use bakery_common::error::{BakeError, Result};
use bakery_common::types::{Config, Group, Target, sanitize_target_name, validate_target_name};

use crate::env::{Environment, compose_env};
use crate::extension;
use crate::loader::model::{BuildConfig, SecretConfig, ServiceConfig, ServiceSecretConfig, SshKey};
use crate::loader::{self, CancelFlag, ConfigDetails, ConfigFile, LocalResources, Project};
use crate::units::{Ulimit, format_mem_bytes};

/// Loads `files` with the environment of `working_dir` and translates them.
///
/// # Errors
///
/// Returns an error if the environment cannot be resolved, the files fail to
/// load, or any service cannot be translated.
pub fn parse_compose_files(files: Vec<ConfigFile>, working_dir: Option<&Path>) -> Result<Config> {
    let environment = compose_env(working_dir)?;
    parse_compose(&ConfigDetails {
        working_dir: working_dir.map(Path::to_path_buf),
        files,
        environment,
    })
}

/// Loads and translates Compose files with the bake loader options.
///
/// # Errors
///
/// Returns an error if loading or translation fails.
pub fn parse_compose(details: &ConfigDetails) -> Result<Config> {
    parse_compose_with(details, &CancelFlag::new())
}

/// Like [`parse_compose`], stopping early once `cancel` is raised.
///
/// # Errors
///
/// Returns [`BakeError::Cancelled`] if cancelled, or any load or translation error.
pub fn parse_compose_with(details: &ConfigDetails, cancel: &CancelFlag) -> Result<Config> {
    let options = LoadOptions::for_environment(&details.environment);
    let project = loader::load_with(details, &options, &LocalResources, cancel)?;
    translate(&project)
}

/// Translates a loaded project into a bake configuration.
///
/// # Errors
///
/// Fails on the first service that cannot be translated; no partial result
/// is returned.
pub fn translate(project: &Project) -> Result<Config> {
    tracing::info!(
        project = %project.name,
        services = project.services.len(),
        "translating compose project"
    );
    let mut config = Config::default();
    if project.services.is_empty() {
        return Ok(config);
    }

    let mut group = Group::new(DEFAULT_GROUP);
    let mut emitted: HashMap<String, String> = HashMap::new();

    for service in project.services.values() {
        let Some(build) = &service.build else {
            tracing::debug!(service = %service.name, "no build block, skipping");
            continue;
        };

        let name = sanitize_target_name(&service.name);
        validate_target_name(&name)
            .map_err(|reason| BakeError::InvalidServiceName { name: name.clone(), reason })?;
        if let Some(previous) = emitted.insert(name.clone(), service.name.clone()) {
            tracing::debug!(target = %name, first = %previous, "target name already emitted");
            return Err(BakeError::DuplicateTarget {
                name,
                service: service.name.clone(),
            });
        }

        let target = translate_service(project, service, build, name)
            .map_err(|e| e.in_service(&service.name))?;
        tracing::debug!(target = %target.name, "target translated");
        group.targets.push(target.name.clone());
        config.targets.push(target);
    }

    config.groups.push(group);
    Ok(config)
}

fn translate_service(
    project: &Project,
    service: &ServiceConfig,
    build: &BuildConfig,
    name: String,
) -> Result<Target> {
    let mut ssh: Vec<String> = build.ssh.iter().map(compose_to_buildkit_ssh).collect();
    ssh.sort();

    // Runtime mounts are not rendered, but an external one cannot be resolved either.
    for reference in &service.secrets {
        if let Some(definition) = project.secrets.get(&reference.source).filter(|d| d.external) {
            return Err(BakeError::UnsupportedSecret {
                name: definition
                    .name
                    .clone()
                    .unwrap_or_else(|| reference.source.clone()),
            });
        }
    }

    let secrets = build
        .secrets
        .iter()
        .map(|reference| {
            let definition = project.secrets.get(&reference.source).cloned().unwrap_or_default();
            compose_to_buildkit_secret(reference, &definition)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut target = Target {
        name,
        context: non_empty(&build.context),
        contexts: build.additional_contexts.clone(),
        dockerfile: non_empty(&build.dockerfile),
        dockerfile_inline: non_empty(&build.dockerfile_inline),
        tags: build.tags.clone(),
        labels: build
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect(),
        args: resolve_args(&build.args, &service.environment, &project.environment),
        cache_from: build.cache_from.clone(),
        cache_to: build.cache_to.clone(),
        network_mode: non_empty(&build.network),
        ssh,
        secrets,
        shm_size: shm_size(build.shm_size),
        ulimits: ulimits(build)?,
        ..Target::default()
    };

    extension::apply(&mut target, &build.extensions)?;

    if !build.target.is_empty() {
        target.target = Some(build.target.clone());
    }
    if target.tags.is_empty() {
        if let Some(image) = service.image.as_ref().filter(|i| !i.is_empty()) {
            target.tags = vec![image.clone()];
        }
    }
    Ok(target)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

fn shm_size(bytes: i64) -> Option<String> {
    u64::try_from(bytes)
        .ok()
        .filter(|b| *b > 0)
        .map(format_mem_bytes)
}

fn ulimits(build: &BuildConfig) -> Result<Vec<String>> {
    build
        .ulimits
        .iter()
        .map(|(name, limit)| {
            let ulimit: Ulimit = format!("{name}={}:{}", limit.soft, limit.hard).parse()?;
            Ok(ulimit.to_string())
        })
        .collect()
}

/// Fills in build arguments declared without a value.
///
/// Values come from the service environment first, then from the project
/// environment. Arguments left without a value are dropped.
fn resolve_args(
    args: &BTreeMap<String, Option<String>>,
    service_env: &BTreeMap<String, Option<String>>,
    project_env: &Environment,
) -> BTreeMap<String, Option<String>> {
    args.iter()
        .filter_map(|(key, value)| {
            let resolved = value.clone().or_else(|| {
                service_env
                    .get(key)
                    .cloned()
                    .flatten()
                    .or_else(|| project_env.get(key).cloned())
            });
            resolved.map(|v| (key.clone(), Some(v)))
        })
        .collect()
}

/// Renders a build secret as the builder's `id=...,src=...,env=...` attribute.
///
/// # Errors
///
/// Returns [`BakeError::UnsupportedSecret`] for external secrets.
pub fn compose_to_buildkit_secret(
    reference: &ServiceSecretConfig,
    definition: &SecretConfig,
) -> Result<String> {
    if definition.external {
        return Err(BakeError::UnsupportedSecret {
            name: definition
                .name
                .clone()
                .unwrap_or_else(|| reference.source.clone()),
        });
    }

    let attrs: Vec<String> = [
        ("id", reference.source.as_str()),
        ("src", definition.file.as_str()),
        ("env", definition.environment.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(key, value)| format!("{key}={value}"))
    .collect();
    Ok(attrs.join(","))
}

/// Renders an SSH entry as `id` or `id=path`.
pub fn compose_to_buildkit_ssh(key: &SshKey) -> String {
    if key.path.is_empty() {
        key.id.clone()
    } else {
        format!("{}={}", key.id, key.path)
    }
}
