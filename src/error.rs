//! Error types for testkit.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for harness, provider and GitOps operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Required configuration or credential is missing. No external call was made.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// An external command exited non-zero or could not be spawned.
    #[error("{program} {args} failed: {output}")]
    Command {
        program: String,
        args: String,
        output: String,
    },

    /// The hosting API returned a non-2xx status or the transport failed.
    #[error("{operation}: {message}")]
    Api { operation: String, message: String },

    /// A response or command output did not have the expected shape.
    #[error("unable to decode {what}: {payload}")]
    Decode { what: String, payload: String },

    /// No capable provider, or no matching remote resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// A change-set file does not have exactly one content source.
    #[error("invalid file {path}: {reason}")]
    InvalidFile { path: PathBuf, reason: String },

    /// `git show --name-status` reported a status other than A, M or D.
    #[error("unknown status {status:?} in commit {sha}")]
    UnknownFileStatus { sha: String, status: String },

    /// A tag or version bound is not valid semver.
    #[error("parsing semver {tag:?}: {source}")]
    Semver {
        tag: String,
        #[source]
        source: semver::Error,
    },

    /// A configuration file could not be parsed.
    #[error("invalid configuration {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// A polled condition did not become true within its budget.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for testkit operations.
pub type Result<T> = std::result::Result<T, Error>;
