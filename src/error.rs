//! Error types for schema resolution and form validation.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::PathSegment;

/// Errors raised while resolving a schema or loading the documents it comes from.
///
/// Resolution errors are fatal to the call that produced them: nothing
/// downstream (defaults, ids, validation) can proceed without a valid shape.
#[derive(Debug, Error)]
pub enum ResolveError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    // Schema errors (exit code 2)
    #[error("could not find a definition for {reference}")]
    MissingDefinition { reference: String },

    #[error("unsupported reference {reference}: expected #/definitions/...")]
    UnsupportedReference { reference: String },

    #[error("cyclic $ref chain: {}", chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    #[error("invalid dependency \"{key}\": {message}")]
    InvalidDependency { key: String, message: String },

    #[error("no field resolver registered under \"{name}\"")]
    UnknownFieldResolver { name: String },

    #[error("invalid ui:order: {message}")]
    InvalidUiOrder { message: String },

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
}

impl ResolveError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ResolveError::FileNotFound { .. } | ResolveError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            ResolveError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Single validation error with path context.
///
/// `path` is authoritative for projection into an [`ErrorSchema`](crate::ErrorSchema);
/// `property` is the dotted data path shown to users (`.level1[1]`, empty at the root).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ValidationError {
    pub path: Vec<PathSegment>,
    pub property: String,
    pub message: String,
    pub stack: String,
}

impl ValidationError {
    /// Build an error the way the validator reports it: `stack` is the
    /// property followed by the message.
    pub fn new(path: Vec<PathSegment>, message: impl Into<String>) -> Self {
        let message = message.into();
        let property = crate::types::property_path(&path);
        let stack = format!("{} {}", property, message).trim().to_string();
        Self {
            path,
            property,
            message,
            stack,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.stack)
    }
}
