use std::path::PathBuf;

use thiserror::Error;

/// Failure while bringing a local clone up to date.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to run git {args}: {source}")]
    Spawn {
        args: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {args} exited with {status}: {stderr}")]
    Git {
        args: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Failure while walking a synchronized operator repository.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("repository path not found: {0}")]
    MissingPath(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CI config {path}: {source}")]
    CiConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Inbound pipeline run event that cannot be interpreted.
#[derive(Error, Debug)]
pub enum MalformedEventError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid timestamp in {field}: {value:?}")]
    Timestamp {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Invalid repository configuration. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid repository {name:?}: {reason}")]
    Invalid { name: String, reason: &'static str },
}
