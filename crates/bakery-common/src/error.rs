//! Unified error type for the Bakery workspace.
//!
//! Translation is all-or-nothing: every failure surfaces to the caller as a
//! [`BakeError`], wrapped with the offending service when one is known.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BakeError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A `.env` file could not be parsed.
    #[error("failed to parse {path}: {message}")]
    DotEnv {
        /// Path of the dotenv file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A document is not well-formed YAML or does not match the Compose model.
    #[error("invalid compose document: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },

    /// The loader rejected the set of files.
    #[error("{message}")]
    Load {
        /// Description of the failure.
        message: String,
    },

    /// A `${...}` expression could not be evaluated.
    #[error("{message}")]
    Interpolation {
        /// Description of the failure, including the value path.
        message: String,
    },

    /// A document does not conform to the Compose schema.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the schema violation.
        message: String,
    },

    /// A service name does not yield a valid target name.
    #[error("invalid service name \"{name}\": {reason}")]
    InvalidServiceName {
        /// The sanitized name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },

    /// Two services produced the same target name.
    #[error("duplicate target name \"{name}\" produced by service \"{service}\"")]
    DuplicateTarget {
        /// The colliding target name.
        name: String,
        /// The second service that produced it.
        service: String,
    },

    /// A ulimit entry does not follow `name=soft[:hard]`.
    #[error("invalid ulimit \"{value}\": {message}")]
    InvalidUlimit {
        /// The rejected ulimit string.
        value: String,
        /// Parser message.
        message: String,
    },

    /// A byte size string could not be parsed.
    #[error("invalid size: '{value}'")]
    InvalidSize {
        /// The rejected size string.
        value: String,
    },

    /// A build refers to a secret whose lifecycle is managed outside the project.
    #[error("unsupported external secret {name}")]
    UnsupportedSecret {
        /// Secret name.
        name: String,
    },

    /// The `x-bake` extension does not match its schema.
    #[error("invalid x-bake extension: {source}")]
    Extension {
        /// Underlying decode error.
        source: serde_yaml::Error,
    },

    /// A failure while translating a specific service.
    #[error("service \"{service}\": {source}")]
    Service {
        /// Name of the service being translated.
        service: String,
        /// Underlying error.
        source: Box<BakeError>,
    },

    /// The caller cancelled loading.
    #[error("operation cancelled")]
    Cancelled,

    /// Serialization of the output configuration failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BakeError {
    /// Wraps `self` with the name of the service being translated.
    #[must_use]
    pub fn in_service(self, service: impl Into<String>) -> Self {
        Self::Service {
            service: service.into(),
            source: Box::new(self),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BakeError>;
