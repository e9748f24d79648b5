//! Options controlling how Compose files are loaded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{ALL_PROFILES, COMPOSE_PROJECT_NAME, DEFAULT_PROJECT_NAME};

/// Loader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Project name used when the documents do not declare a top-level `name`.
    pub project_name: String,
    /// Skip default values and path resolution applied after merging.
    pub skip_normalization: bool,
    /// Skip cross-reference checks (undefined secrets, services without image or build).
    pub skip_consistency_check: bool,
    /// Active profiles; `*` activates every service.
    pub profiles: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            project_name: DEFAULT_PROJECT_NAME.to_owned(),
            skip_normalization: false,
            skip_consistency_check: false,
            profiles: Vec::new(),
        }
    }
}

impl LoadOptions {
    /// Options used when translating Compose files into bake targets.
    ///
    /// The project name comes from `COMPOSE_PROJECT_NAME` when it is set to a
    /// non-empty value. Normalization is skipped and every profile is active.
    #[must_use]
    pub fn for_environment(env: &BTreeMap<String, String>) -> Self {
        let project_name = env
            .get(COMPOSE_PROJECT_NAME)
            .filter(|v| !v.is_empty())
            .map_or_else(|| DEFAULT_PROJECT_NAME.to_owned(), Clone::clone);
        Self {
            project_name,
            skip_normalization: true,
            skip_consistency_check: false,
            profiles: vec![ALL_PROFILES.to_owned()],
        }
    }

    /// Options used to validate a single file in isolation.
    ///
    /// Consistency is checked later, once every file has been merged.
    #[must_use]
    pub fn for_validation() -> Self {
        Self {
            project_name: DEFAULT_PROJECT_NAME.to_owned(),
            skip_normalization: true,
            skip_consistency_check: true,
            profiles: Vec::new(),
        }
    }

    /// Returns whether a service declaring `profiles` is active.
    pub fn is_active(&self, profiles: &[String]) -> bool {
        profiles.is_empty()
            || self
                .profiles
                .iter()
                .any(|p| p == ALL_PROFILES || profiles.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_name_defaults_to_bake() {
        let opts = LoadOptions::for_environment(&BTreeMap::new());
        assert_eq!(opts.project_name, "bake");
        assert!(opts.skip_normalization);
        assert_eq!(opts.profiles, vec!["*".to_owned()]);
    }

    #[test]
    fn empty_project_name_is_ignored() {
        let mut env = BTreeMap::new();
        let _ = env.insert(COMPOSE_PROJECT_NAME.to_owned(), String::new());
        assert_eq!(LoadOptions::for_environment(&env).project_name, "bake");
    }

    #[test]
    fn project_name_from_environment() {
        let mut env = BTreeMap::new();
        let _ = env.insert(COMPOSE_PROJECT_NAME.to_owned(), "shop".to_owned());
        assert_eq!(LoadOptions::for_environment(&env).project_name, "shop");
    }

    #[test]
    fn wildcard_activates_profiled_services() {
        let opts = LoadOptions::for_environment(&BTreeMap::new());
        assert!(opts.is_active(&["debug".to_owned()]));
    }

    #[test]
    fn profiled_service_inactive_without_match() {
        let opts = LoadOptions {
            profiles: vec!["prod".to_owned()],
            ..LoadOptions::default()
        };
        assert!(opts.is_active(&[]));
        assert!(!opts.is_active(&["debug".to_owned()]));
        assert!(opts.is_active(&["prod".to_owned()]));
    }
}
