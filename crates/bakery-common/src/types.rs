//! Bake configuration model: targets grouped into named groups.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A named collection of target names built together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Group {
    /// Group name.
    #[serde(skip)]
    pub name: String,
    /// Member target names, in emission order.
    pub targets: Vec<String>,
}

impl Group {
    /// Creates an empty group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            targets: Vec::new(),
        }
    }
}

/// A self-contained build recipe.
///
/// `Option` fields distinguish "unset" from "set to an empty value".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Target {
    /// Target name (sanitized service name).
    #[serde(skip)]
    pub name: String,
    /// Build context root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Additional named build contexts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contexts: Option<BTreeMap<String, String>>,
    /// Dockerfile path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    /// Inline Dockerfile content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile_inline: Option<String>,
    /// Image references to tag the result with.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Image labels.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, Option<String>>,
    /// Build arguments.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, Option<String>>,
    /// Cache import sources.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cache_from: Vec<String>,
    /// Cache export destinations.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cache_to: Vec<String>,
    /// Network mode for `RUN` instructions.
    #[serde(rename = "network", skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    /// SSH agent sockets or keys, `id[=path]`, sorted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh: Vec<String>,
    /// Secrets, `id=…,src=…,env=…`.
    #[serde(rename = "secret", skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    /// Size of `/dev/shm`, human readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shm_size: Option<String>,
    /// Ulimits, `name=soft:hard`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ulimits: Vec<String>,
    /// Multi-stage target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Target platforms.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
    /// Output destinations.
    #[serde(rename = "output", skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    /// Always pull referenced images.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull: Option<bool>,
    /// Disable the build cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_cache: Option<bool>,
    /// Stages excluded from the build cache.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub no_cache_filter: Vec<String>,
}

impl Target {
    /// Creates a target with only its name set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Groups and targets produced from a Compose project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Groups, in emission order.
    pub groups: Vec<Group>,
    /// Targets, in emission order.
    pub targets: Vec<Target>,
}

impl Config {
    /// Looks up a target by name.
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Looks up a group by name.
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }
}

impl Serialize for Config {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let groups: IndexMap<&str, &Group> =
            self.groups.iter().map(|g| (g.name.as_str(), g)).collect();
        let targets: IndexMap<&str, &Target> =
            self.targets.iter().map(|t| (t.name.as_str(), t)).collect();
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("group", &groups)?;
        map.serialize_entry("target", &targets)?;
        map.end()
    }
}

const fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_name_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Maps a Compose service name onto the target name grammar.
///
/// Compose allows dots in service names; they become underscores.
pub fn sanitize_target_name(name: &str) -> String {
    name.replace('.', "_")
}

/// Checks a target name against `[A-Za-z_][A-Za-z0-9_-]*`.
///
/// # Errors
///
/// Returns the reason the name was rejected.
pub fn validate_target_name(name: &str) -> Result<(), &'static str> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("name must not be empty");
    };
    if !is_name_start(first) {
        return Err("name must start with a letter or '_'");
    }
    if !chars.all(is_name_continue) {
        return Err("only letters, digits, '_' and '-' are allowed");
    }
    Ok(())
}
