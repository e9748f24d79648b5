//! Typed view of the Compose document fields the translator consumes.
//!
//! Compose accepts several shapes for the same field (list or mapping,
//! number or string). The `de_*` helpers collapse them into one Rust type.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

use crate::units::parse_ram_in_bytes;

/// A merged Compose document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposeFile {
    /// Top-level project name.
    #[serde(default)]
    pub name: Option<String>,
    /// Services keyed by name, in document order.
    #[serde(default, deserialize_with = "de_or_default")]
    pub services: IndexMap<String, ServiceConfig>,
    /// Project-level secret definitions.
    #[serde(default, deserialize_with = "de_or_default")]
    pub secrets: IndexMap<String, SecretConfig>,
}

/// A service definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    /// Service name (the mapping key).
    #[serde(skip)]
    pub name: String,
    /// Image reference.
    #[serde(default)]
    pub image: Option<String>,
    /// Build block.
    #[serde(default)]
    pub build: Option<BuildConfig>,
    /// Container environment; `None` values are declared without a value.
    #[serde(default, deserialize_with = "de_mapping_with_equals")]
    pub environment: BTreeMap<String, Option<String>>,
    /// Profiles the service belongs to.
    #[serde(default, deserialize_with = "de_or_default")]
    pub profiles: Vec<String>,
    /// Secrets mounted into the running container.
    #[serde(default, deserialize_with = "de_or_default")]
    pub secrets: Vec<ServiceSecretConfig>,
    /// Services this one depends on, mapped to whether the dependency is required.
    #[serde(default, deserialize_with = "de_depends_on")]
    pub depends_on: IndexMap<String, bool>,
}

/// The `build` block of a service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildConfig {
    /// Build context.
    #[serde(default, deserialize_with = "de_or_default")]
    pub context: String,
    /// Dockerfile path.
    #[serde(default, deserialize_with = "de_or_default")]
    pub dockerfile: String,
    /// Inline Dockerfile content.
    #[serde(default, deserialize_with = "de_or_default")]
    pub dockerfile_inline: String,
    /// Named contexts; `None` when the field is absent.
    #[serde(default, deserialize_with = "de_optional_string_mapping")]
    pub additional_contexts: Option<BTreeMap<String, String>>,
    /// Build arguments; `None` values are declared without a value.
    #[serde(default, deserialize_with = "de_mapping_with_equals")]
    pub args: BTreeMap<String, Option<String>>,
    /// SSH agent sockets or keys.
    #[serde(default, deserialize_with = "de_ssh_keys")]
    pub ssh: Vec<SshKey>,
    /// Image labels.
    #[serde(default, deserialize_with = "de_labels")]
    pub labels: BTreeMap<String, String>,
    /// Cache import sources.
    #[serde(default, deserialize_with = "de_or_default")]
    pub cache_from: Vec<String>,
    /// Cache export destinations.
    #[serde(default, deserialize_with = "de_or_default")]
    pub cache_to: Vec<String>,
    /// Network mode for `RUN` instructions.
    #[serde(default, deserialize_with = "de_or_default")]
    pub network: String,
    /// Multi-stage target.
    #[serde(default, deserialize_with = "de_or_default")]
    pub target: String,
    /// Size of `/dev/shm` in bytes; zero when unset.
    #[serde(default, deserialize_with = "de_unit_bytes")]
    pub shm_size: i64,
    /// Additional tags.
    #[serde(default, deserialize_with = "de_or_default")]
    pub tags: Vec<String>,
    /// Ulimits keyed by resource name.
    #[serde(default, deserialize_with = "de_ulimits")]
    pub ulimits: BTreeMap<String, UlimitConfig>,
    /// Secret references.
    #[serde(default, deserialize_with = "de_or_default")]
    pub secrets: Vec<ServiceSecretConfig>,
    /// Every other key, including `x-*` extensions.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

/// An SSH entry: `default`, `id`, or `id=path`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshKey {
    /// Key identifier.
    pub id: String,
    /// Socket or key path, empty when unset.
    pub path: String,
}

impl SshKey {
    fn parse(entry: &str) -> Self {
        match entry.split_once('=') {
            Some((id, path)) => Self {
                id: id.to_owned(),
                path: path.to_owned(),
            },
            None => Self {
                id: entry.to_owned(),
                path: String::new(),
            },
        }
    }
}

/// Soft and hard values of a ulimit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UlimitConfig {
    /// Soft limit.
    pub soft: i64,
    /// Hard limit.
    pub hard: i64,
}

/// A secret reference inside a service or build block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSecretConfig {
    /// Name of the project-level secret.
    pub source: String,
    /// Mount target, if given.
    pub target: Option<String>,
}

impl<'de> Deserialize<'de> for ServiceSecretConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Short(String),
            Long {
                source: String,
                #[serde(default)]
                target: Option<String>,
            },
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Short(source) => Self {
                source,
                target: None,
            },
            Raw::Long { source, target } => Self { source, target },
        })
    }
}

/// A project-level secret definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretConfig {
    /// Explicit name; defaults to the mapping key.
    #[serde(default)]
    pub name: Option<String>,
    /// File holding the secret.
    #[serde(default, deserialize_with = "de_or_default")]
    pub file: String,
    /// Environment variable holding the secret.
    #[serde(default, deserialize_with = "de_or_default")]
    pub environment: String,
    /// Whether the secret is managed outside the project.
    #[serde(default, deserialize_with = "de_external")]
    pub external: bool,
}

/// A scalar as written in YAML, rendered back to text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ListOrMap {
    List(Vec<String>),
    Map(IndexMap<String, Option<Scalar>>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Text(String),
}

impl IntOrString {
    fn to_i64<E: serde::de::Error>(&self) -> Result<i64, E> {
        match self {
            Self::Int(i) => Ok(*i),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid integer \"{s}\""))),
        }
    }
}

/// Treats an explicit `null` like an absent field.
fn de_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `["K=V", "K"]` or `{K: V, K: null}`; `K` alone has no value.
fn de_mapping_with_equals<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<ListOrMap>::deserialize(deserializer)? {
        None => BTreeMap::new(),
        Some(ListOrMap::List(entries)) => entries
            .iter()
            .map(|e| match e.split_once('=') {
                Some((k, v)) => (k.to_owned(), Some(v.to_owned())),
                None => (e.clone(), None),
            })
            .collect(),
        Some(ListOrMap::Map(map)) => map
            .into_iter()
            .map(|(k, v)| (k, v.map(|s| s.to_string())))
            .collect(),
    })
}

/// Labels: list entries without `=` have an empty value, null mapping values are dropped.
fn de_labels<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<ListOrMap>::deserialize(deserializer)? {
        None => BTreeMap::new(),
        Some(ListOrMap::List(entries)) => entries
            .iter()
            .map(|e| match e.split_once('=') {
                Some((k, v)) => (k.to_owned(), v.to_owned()),
                None => (e.clone(), String::new()),
            })
            .collect(),
        Some(ListOrMap::Map(map)) => map
            .into_iter()
            .filter_map(|(k, v)| v.map(|s| (k, s.to_string())))
            .collect(),
    })
}

fn de_optional_string_mapping<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ListOrMap>::deserialize(deserializer)?.map(|shape| match shape {
        ListOrMap::List(entries) => entries
            .iter()
            .map(|e| match e.split_once('=') {
                Some((k, v)) => (k.to_owned(), v.to_owned()),
                None => (e.clone(), String::new()),
            })
            .collect(),
        ListOrMap::Map(map) => map
            .into_iter()
            .map(|(k, v)| (k, v.map(|s| s.to_string()).unwrap_or_default()))
            .collect(),
    }))
}

fn de_ssh_keys<'de, D>(deserializer: D) -> Result<Vec<SshKey>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        List(Vec<String>),
        Map(IndexMap<String, Option<String>>),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Raw::One(entry)) => vec![SshKey::parse(&entry)],
        Some(Raw::List(entries)) => entries.iter().map(|e| SshKey::parse(e)).collect(),
        Some(Raw::Map(map)) => map
            .into_iter()
            .map(|(id, path)| SshKey {
                id,
                path: path.unwrap_or_default(),
            })
            .collect(),
    })
}

/// Integer byte count or a size string such as `2g`.
fn de_unit_bytes<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<IntOrString>::deserialize(deserializer)? {
        None => Ok(0),
        Some(IntOrString::Int(i)) => Ok(i),
        Some(IntOrString::Text(s)) => parse_ram_in_bytes(&s).map_err(serde::de::Error::custom),
    }
}

/// `name: 1024` or `name: {soft: 1024, hard: 2048}`.
fn de_ulimits<'de, D>(deserializer: D) -> Result<BTreeMap<String, UlimitConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Single(IntOrString),
        Pair { soft: IntOrString, hard: IntOrString },
    }
    let raw = Option::<BTreeMap<String, Raw>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|(name, limit)| {
            let config = match limit {
                Raw::Single(v) => {
                    let v = v.to_i64::<D::Error>()?;
                    UlimitConfig { soft: v, hard: v }
                }
                Raw::Pair { soft, hard } => UlimitConfig {
                    soft: soft.to_i64::<D::Error>()?,
                    hard: hard.to_i64::<D::Error>()?,
                },
            };
            Ok((name, config))
        })
        .collect()
}

/// `[db, cache]` or `{db: {condition: service_healthy, required: false}}`.
fn de_depends_on<'de, D>(deserializer: D) -> Result<IndexMap<String, bool>, D::Error>
where
    D: Deserializer<'de>,
{
    const fn required_by_default() -> bool {
        true
    }

    #[derive(Deserialize)]
    struct Dependency {
        #[serde(default = "required_by_default")]
        required: bool,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Map(IndexMap<String, Option<Dependency>>),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => IndexMap::new(),
        Some(Raw::List(names)) => names.into_iter().map(|n| (n, true)).collect(),
        Some(Raw::Map(map)) => map
            .into_iter()
            .map(|(n, dep)| (n, dep.is_none_or(|d| d.required)))
            .collect(),
    })
}

/// `external: true` or the legacy `external: {name: ...}` form.
fn de_external<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Named(serde_yaml::Mapping),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => false,
        Some(Raw::Flag(flag)) => flag,
        Some(Raw::Named(_)) => true,
    })
}
