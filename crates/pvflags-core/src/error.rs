use std::path::PathBuf;

use thiserror::Error;

/// Failure to retrieve a flag document.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "http")]
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("URL locations are not supported (build with feature 'http'): {0}")]
    Unsupported(String),
}

/// Failure of a configuration load. The previously loaded flags stay active.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("invalid flag document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("load #{ticket} finished after load #{applied} was already applied")]
    Superseded { ticket: u64, applied: u64 },

    #[error("load worker exited without reporting a result")]
    WorkerGone,
}

/// Failure to persist or read debug overrides.
#[derive(Error, Debug)]
pub enum OverrideError {
    #[error("override store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed override file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to encode overrides: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Rejected core-option operation.
#[derive(Error, Debug)]
pub enum OptionError {
    #[error("unknown option '{0}'")]
    UnknownKey(String),

    #[error("option '{key}' is a group and holds no value")]
    NotAValue { key: String },

    #[error("option '{key}' expects {expected}, got {got}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("option '{key}' value {value} is outside {min}..={max}")]
    OutOfRange {
        key: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("option '{key}' has no choice '{value}'")]
    NotAChoice { key: String, value: String },

    #[error("malformed option definitions: {0}")]
    Definitions(#[from] serde_json::Error),

    #[error("option '{key}' is declared wrong: {reason}")]
    InvalidDefinition { key: String, reason: String },

    #[error("option store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed option file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to encode option values: {0}")]
    Encode(#[from] toml::ser::Error),
}
