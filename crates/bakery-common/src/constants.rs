//! Well-known names and defaults.

/// Environment variable naming the Compose project.
pub const COMPOSE_PROJECT_NAME: &str = "COMPOSE_PROJECT_NAME";

/// Project name used when `COMPOSE_PROJECT_NAME` is unset or empty.
pub const DEFAULT_PROJECT_NAME: &str = "bake";

/// Name of the group that collects every translated target.
pub const DEFAULT_GROUP: &str = "default";

/// Dotenv file looked up in the working directory.
pub const DOTENV_FILE: &str = ".env";

/// Compose build extension carrying bake-only options.
pub const X_BAKE: &str = "x-bake";

/// Prefix of Compose extension fields.
pub const EXTENSION_PREFIX: &str = "x-";

/// Profile selector that activates every service.
pub const ALL_PROFILES: &str = "*";
