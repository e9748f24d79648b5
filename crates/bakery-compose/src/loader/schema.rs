//! Structural checks of a Compose document against the Compose schema.
//!
//! Verifies the shape of the sections the loader relies on and rejects
//! unknown properties. Extension fields (`x-*`) are accepted everywhere.
//! Field types below these sections are checked by the typed decode.

use bakery_common::constants::EXTENSION_PREFIX;
use bakery_common::error::{BakeError, Result};
use serde_yaml::{Mapping, Value};

const TOP_LEVEL_KEYS: &[&str] = &[
    "version", "name", "include", "services", "networks", "volumes", "secrets", "configs",
    "models",
];

const SERVICE_KEYS: &[&str] = &[
    "annotations",
    "attach",
    "blkio_config",
    "build",
    "cap_add",
    "cap_drop",
    "cgroup",
    "cgroup_parent",
    "command",
    "configs",
    "container_name",
    "cpu_count",
    "cpu_percent",
    "cpu_period",
    "cpu_quota",
    "cpu_rt_period",
    "cpu_rt_runtime",
    "cpu_shares",
    "cpus",
    "cpuset",
    "credential_spec",
    "depends_on",
    "deploy",
    "develop",
    "device_cgroup_rules",
    "devices",
    "dns",
    "dns_opt",
    "dns_search",
    "domainname",
    "entrypoint",
    "env_file",
    "environment",
    "expose",
    "extends",
    "external_links",
    "extra_hosts",
    "gpus",
    "group_add",
    "healthcheck",
    "hostname",
    "image",
    "init",
    "ipc",
    "isolation",
    "label_file",
    "labels",
    "links",
    "logging",
    "mac_address",
    "mem_limit",
    "mem_reservation",
    "mem_swappiness",
    "memswap_limit",
    "models",
    "network_mode",
    "networks",
    "oom_kill_disable",
    "oom_score_adj",
    "pid",
    "pids_limit",
    "platform",
    "ports",
    "post_start",
    "pre_stop",
    "privileged",
    "profiles",
    "provider",
    "pull_policy",
    "read_only",
    "restart",
    "runtime",
    "scale",
    "secrets",
    "security_opt",
    "shm_size",
    "stdin_open",
    "stop_grace_period",
    "stop_signal",
    "storage_opt",
    "sysctls",
    "tmpfs",
    "tty",
    "ulimits",
    "use_api_socket",
    "user",
    "userns_mode",
    "uts",
    "volumes",
    "volumes_from",
    "working_dir",
];

const BUILD_KEYS: &[&str] = &[
    "additional_contexts",
    "args",
    "cache_from",
    "cache_to",
    "context",
    "dockerfile",
    "dockerfile_inline",
    "entitlements",
    "extra_hosts",
    "isolation",
    "labels",
    "network",
    "no_cache",
    "platforms",
    "privileged",
    "provenance",
    "pull",
    "sbom",
    "secrets",
    "shm_size",
    "ssh",
    "tags",
    "target",
    "ulimits",
];

const SECRET_KEYS: &[&str] = &[
    "content",
    "driver",
    "driver_opts",
    "environment",
    "external",
    "file",
    "labels",
    "name",
    "template_driver",
];

/// Validates the structure of a parsed (and interpolated) Compose document.
///
/// # Checks performed
///
/// 1. The document is a mapping with known top-level sections.
/// 2. `services` maps names to mappings with known service properties.
/// 3. `build` is a string or a mapping with known build properties.
/// 4. `secrets` maps names to mappings with known secret properties.
/// 5. `include` is a sequence.
///
/// # Errors
///
/// Returns [`BakeError::Validation`] describing the first violation found.
pub fn validate(doc: &Value) -> Result<()> {
    tracing::debug!("validating compose document structure");
    let root = doc
        .as_mapping()
        .ok_or_else(|| invalid("top-level object must be a mapping".to_owned()))?;
    check_keys(root, TOP_LEVEL_KEYS, "(root)")?;
    check_services(root)?;
    check_secrets(root)?;
    check_include(root)?;
    Ok(())
}

const fn invalid(message: String) -> BakeError {
    BakeError::Validation { message }
}

fn key_str<'a>(key: &'a Value, at: &str) -> Result<&'a str> {
    key.as_str()
        .ok_or_else(|| invalid(format!("{at}: property names must be strings, got {key:?}")))
}

fn check_keys(map: &Mapping, allowed: &[&str], at: &str) -> Result<()> {
    for key in map.keys() {
        let key = key_str(key, at)?;
        if key.starts_with(EXTENSION_PREFIX) || allowed.contains(&key) {
            continue;
        }
        return Err(invalid(format!(
            "{at}: additional property \"{key}\" is not allowed"
        )));
    }
    Ok(())
}

/// Returns the named section as a mapping, treating an explicit `null` as absent.
fn section<'a>(root: &'a Mapping, name: &str) -> Result<Option<&'a Mapping>> {
    match root.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Mapping(m)) => Ok(Some(m)),
        Some(_) => Err(invalid(format!("{name} must be a mapping"))),
    }
}

fn check_services(root: &Mapping) -> Result<()> {
    let Some(services) = section(root, "services")? else {
        return Ok(());
    };
    for (name, service) in services {
        let name = key_str(name, "services")?;
        let at = format!("services.{name}");
        let service = service
            .as_mapping()
            .ok_or_else(|| invalid(format!("{at} must be a mapping")))?;
        check_keys(service, SERVICE_KEYS, &at)?;

        match service.get("build") {
            None | Some(Value::Null | Value::String(_)) => {}
            Some(Value::Mapping(build)) => check_keys(build, BUILD_KEYS, &format!("{at}.build"))?,
            Some(_) => {
                return Err(invalid(format!(
                    "{at}.build must be a string or a mapping"
                )));
            }
        }
    }
    Ok(())
}

fn check_secrets(root: &Mapping) -> Result<()> {
    let Some(secrets) = section(root, "secrets")? else {
        return Ok(());
    };
    for (name, secret) in secrets {
        let name = key_str(name, "secrets")?;
        let at = format!("secrets.{name}");
        let secret = secret
            .as_mapping()
            .ok_or_else(|| invalid(format!("{at} must be a mapping")))?;
        check_keys(secret, SECRET_KEYS, &at)?;
    }
    Ok(())
}

fn check_include(root: &Mapping) -> Result<()> {
    match root.get("include") {
        None | Some(Value::Null | Value::Sequence(_)) => Ok(()),
        Some(_) => Err(invalid("include must be a sequence".to_owned())),
    }
}
