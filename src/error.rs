// src/error.rs

//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A single problem found while validating user options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// One or more keys that are not recognized options.
    #[error("Unknown option{}: {}", plural(.0), .0.join(", "))]
    UnknownOptions(Vec<String>),
    /// A recognized key holding a value of the wrong type.
    #[error("Expecting {expected} for property {property} but {given} was given.")]
    InvalidType {
        property: String,
        expected: &'static str,
        given: &'static str,
    },
    /// A port number outside `1..=65535`.
    #[error("Port {0} is out of range (expected 1-65535).")]
    PortOutOfRange(serde_json::Number),
    /// Options that passed key checks but still failed to deserialize.
    #[error("Malformed options: {0}")]
    Malformed(String),
}

/// Errors raised while building a [`ProviderOptions`](crate::config::ProviderOptions).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Options did not pass validation: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("Cannot resolve project root: {0}")]
    ProjectRoot(#[source] io::Error),
}

impl ConfigError {
    /// The individual validation failures, empty for load errors.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            ConfigError::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

fn plural(items: &[String]) -> &'static str {
    if items.len() > 1 {
        "s"
    } else {
        ""
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Failure of the document transformer. Never fatal to the server.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Parse(#[from] serde_json::Error),
    #[error("cannot run transformer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("transformer `{program}` exited with {status}: {stderr}")]
    Command {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Errors returned by the server, watcher and orchestrator lifecycles.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Can't find available port to start server on {host} (tried {first}-{last}).")]
    PortExhausted { host: String, first: u16, last: u16 },
    #[error("Server is not running. Call start() first.")]
    ServerNotRunning,
    #[error("Server is already listening on port {0}.")]
    AlreadyRunning(u16),
    #[error("Cannot resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("Cannot watch {}: {reason}", path.display())]
    Watch { path: PathBuf, reason: String },
    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<notify::Error> for Error {
    fn from(e: notify::Error) -> Self {
        Error::Watch {
            path: e.paths.first().cloned().unwrap_or_default(),
            reason: e.to_string(),
        }
    }
}
