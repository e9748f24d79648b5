//! The `x-bake` build extension.
//!
//! Carries build options Compose has no field for. Every list field accepts
//! either a YAML sequence or a single whitespace-separated string.

use std::collections::{BTreeMap, HashSet};

use bakery_common::constants::X_BAKE;
use bakery_common::error::{BakeError, Result};
use bakery_common::types::Target;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

use crate::loader::model::Scalar;

/// Decoded `x-bake` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct XBake {
    /// Additional tags.
    #[serde(default, deserialize_with = "string_array")]
    pub tags: Vec<String>,
    /// Additional cache import sources.
    #[serde(default, deserialize_with = "string_array")]
    pub cache_from: Vec<String>,
    /// Additional cache export destinations.
    #[serde(default, deserialize_with = "string_array")]
    pub cache_to: Vec<String>,
    /// Secrets in `id=...,src=...` form.
    #[serde(default, rename = "secret", deserialize_with = "string_array")]
    pub secrets: Vec<String>,
    /// SSH agent sockets or keys.
    #[serde(default, deserialize_with = "string_array")]
    pub ssh: Vec<String>,
    /// Target platforms.
    #[serde(default, deserialize_with = "string_array")]
    pub platforms: Vec<String>,
    /// Output destinations.
    #[serde(default, rename = "output", deserialize_with = "string_array")]
    pub outputs: Vec<String>,
    /// Always pull referenced images.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub pull: Option<bool>,
    /// Disable the build cache.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub no_cache: Option<bool>,
    /// Stages built without cache.
    #[serde(default, deserialize_with = "string_array")]
    pub no_cache_filter: Vec<String>,
    /// Named contexts, overriding `additional_contexts`.
    #[serde(default)]
    pub contexts: Option<BTreeMap<String, String>>,
}

/// A sequence of scalars, or one scalar split on runs of whitespace.
///
/// Numbers and booleans are kept as their text, so `tags: [2, v1]` is valid.
fn string_array<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Many(Vec<Scalar>),
        One(Scalar),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Raw::Many(items)) => items.iter().map(ToString::to_string).collect(),
        Some(Raw::One(single)) => single
            .to_string()
            .split_whitespace()
            .map(str::to_owned)
            .collect(),
    })
}

/// A boolean, also accepting `"true"`/`"false"` left behind by interpolation.
fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Text(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Flag(flag)) => Ok(Some(flag)),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid boolean \"{text}\""))),
    }
}

/// Decodes the `x-bake` entry of a build block's extensions, if present.
///
/// # Errors
///
/// Returns [`BakeError::Extension`] if the value does not match the schema.
pub fn decode(extensions: &BTreeMap<String, Value>) -> Result<Option<XBake>> {
    match extensions.get(X_BAKE) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_yaml::from_value(value.clone())
            .map(Some)
            .map_err(|source| BakeError::Extension { source }),
    }
}

/// Merges the `x-bake` extension of a build block into `target`.
///
/// # Errors
///
/// Returns [`BakeError::Extension`] if the extension cannot be decoded.
pub fn apply(target: &mut Target, extensions: &BTreeMap<String, Value>) -> Result<()> {
    let Some(xb) = decode(extensions)? else {
        return Ok(());
    };
    tracing::debug!(target = %target.name, "applying x-bake extension");

    extend_unique(&mut target.tags, xb.tags);
    extend_unique(&mut target.cache_from, xb.cache_from);
    extend_unique(&mut target.cache_to, xb.cache_to);
    extend_unique(&mut target.secrets, xb.secrets);
    if !xb.ssh.is_empty() {
        extend_unique(&mut target.ssh, xb.ssh);
        target.ssh.sort();
    }
    extend_unique(&mut target.platforms, xb.platforms);
    extend_unique(&mut target.outputs, xb.outputs);
    if xb.pull.is_some() {
        target.pull = xb.pull;
    }
    if xb.no_cache.is_some() {
        target.no_cache = xb.no_cache;
    }
    extend_unique(&mut target.no_cache_filter, xb.no_cache_filter);
    if let Some(contexts) = xb.contexts.filter(|c| !c.is_empty()) {
        target.contexts = Some(dedup_map(target.contexts.take(), contexts));
    }
    Ok(())
}

fn extend_unique(existing: &mut Vec<String>, overlay: Vec<String>) {
    if overlay.is_empty() {
        return;
    }
    existing.extend(overlay);
    *existing = dedup_slice(std::mem::take(existing));
}

/// Removes duplicates, keeping the first occurrence of each entry.
pub fn dedup_slice(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Unions two maps; entries of `overlay` win.
pub fn dedup_map(
    base: Option<BTreeMap<String, String>>,
    overlay: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.unwrap_or_default();
    merged.extend(overlay);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensions(yaml: &str) -> BTreeMap<String, Value> {
        serde_yaml::from_str(yaml).expect("yaml")
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn missing_or_null_extension_leaves_target_alone() {
        let mut target = Target::new("app");
        target.tags = strings(&["a"]);
        apply(&mut target, &BTreeMap::new()).expect("apply");
        apply(&mut target, &extensions("x-bake: null")).expect("apply");
        assert_eq!(target, {
            let mut t = Target::new("app");
            t.tags = strings(&["a"]);
            t
        });
    }

    #[test]
    fn string_and_sequence_forms_are_equivalent() {
        let as_string = decode(&extensions(
            "x-bake:\n  tags: \"a  b\\tc\"\n  platforms: linux/amd64 linux/arm64\n",
        ))
        .expect("decode");
        let as_sequence = decode(&extensions(
            "x-bake:\n  tags: [a, b, c]\n  platforms: [linux/amd64, linux/arm64]\n",
        ))
        .expect("decode");
        assert_eq!(as_string, as_sequence);
    }

    #[test]
    fn non_string_scalars_are_rendered_as_text() {
        let xb = decode(&extensions("x-bake:\n  tags: [2, v1, true, 1.5]\n  platforms: 7\n"))
            .expect("decode")
            .expect("present");
        assert_eq!(xb.tags, strings(&["2", "v1", "true", "1.5"]));
        assert_eq!(xb.platforms, strings(&["7"]));
    }

    #[test]
    fn lists_dedup_keeping_first_occurrence() {
        let mut target = Target::new("app");
        target.tags = strings(&["a", "b"]);
        target.cache_from = strings(&["type=local,src=x"]);
        apply(
            &mut target,
            &extensions("x-bake:\n  tags: b c a\n  cache-from: [\"type=local,src=x\", \"type=gha\"]\n"),
        )
        .expect("apply");
        assert_eq!(target.tags, strings(&["a", "b", "c"]));
        assert_eq!(target.cache_from, strings(&["type=local,src=x", "type=gha"]));
    }

    #[test]
    fn ssh_is_sorted_after_merge() {
        let mut target = Target::new("app");
        target.ssh = strings(&["default"]);
        apply(&mut target, &extensions("x-bake:\n  ssh: [key, agent]\n")).expect("apply");
        assert_eq!(target.ssh, strings(&["agent", "default", "key"]));
    }

    #[test]
    fn booleans_override_when_present() {
        let mut target = Target::new("app");
        target.pull = Some(false);
        apply(&mut target, &extensions("x-bake:\n  pull: true\n  no-cache: \"false\"\n")).expect("apply");
        assert_eq!(target.pull, Some(true));
        assert_eq!(target.no_cache, Some(false));

        apply(&mut target, &extensions("x-bake:\n  pull: null\n")).expect("apply");
        assert_eq!(target.pull, Some(true));
    }

    #[test]
    fn contexts_overlay_wins() {
        let mut target = Target::new("app");
        target.contexts = Some(
            [("base".to_owned(), "./a".to_owned()), ("keep".to_owned(), "./k".to_owned())]
                .into_iter()
                .collect(),
        );
        apply(&mut target, &extensions("x-bake:\n  contexts:\n    base: ./b\n")).expect("apply");
        let contexts = target.contexts.expect("contexts");
        assert_eq!(contexts["base"], "./b");
        assert_eq!(contexts["keep"], "./k");
    }

    #[test]
    fn x_bake_only_fields() {
        let mut target = Target::new("app");
        apply(
            &mut target,
            &extensions("x-bake:\n  output: type=docker\n  no-cache-filter: [build]\n  secret: id=a\n  unknown: 1\n"),
        )
        .expect("apply");
        assert_eq!(target.outputs, strings(&["type=docker"]));
        assert_eq!(target.no_cache_filter, strings(&["build"]));
        assert_eq!(target.secrets, strings(&["id=a"]));
    }

    #[test]
    fn invalid_extension_fails() {
        let mut target = Target::new("app");
        let err = apply(&mut target, &extensions("x-bake:\n  tags: {a: b}\n")).unwrap_err();
        assert!(matches!(err, BakeError::Extension { .. }));
        let err = apply(&mut target, &extensions("x-bake:\n  pull: maybe\n")).unwrap_err();
        assert!(err.to_string().starts_with("invalid x-bake extension"), "got: {err}");
    }

    #[test]
    fn dedup_slice_preserves_order() {
        assert_eq!(
            dedup_slice(strings(&["c", "a", "c", "b", "a"])),
            strings(&["c", "a", "b"])
        );
    }
}
