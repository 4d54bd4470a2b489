//! Error types for every stage of a tidyplan run.
//!
//! Each stage owns a narrow error type so callers can tell a safety abort from a
//! structural rejection, an execution failure, or a failed rollback. [`Error`]
//! wraps them all for the top-level API.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A safety or boundary violation. Raised before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Abort {
    pub reason: String,
}

impl Abort {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A structural defect found in a plan right before execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plan rejected: {reason}")]
pub struct ValidationRejection {
    pub reason: String,
}

impl ValidationRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The intent handed to the planner could not be turned into operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("malformed intent: {0}")]
    Malformed(String),
    #[error("unknown action type: {0}")]
    UnknownAction(String),
    #[error("{action} action is missing {field}")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },
}

/// A filesystem operation failed while a transaction was running.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("source does not exist: {}", path.display())]
    SourceMissing { path: PathBuf },
    #[error("destination already exists: {}", path.display())]
    DestinationExists { path: PathBuf },
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An undo step failed. The tree may now be partially applied.
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("cannot restore {}: it no longer exists", path.display())]
    SourceMissing { path: PathBuf },
    #[error("cannot restore to {}: the location is occupied", path.display())]
    Occupied { path: PathBuf },
    #[error("rollback failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The audit log could not be written or read.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("cannot open audit log {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot append to audit log {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("audit log {} line {line} is not a valid record: {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Errors raised while loading configuration or compiling filters.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),
    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    #[error("IO error reading configuration: {0}")]
    Io(String),
}

/// Top-level error for the tidyplan API.
#[derive(Debug, Error)]
pub enum Error {
    #[error("aborted: {0}")]
    Abort(#[from] Abort),
    #[error(transparent)]
    Rejected(#[from] ValidationRejection),
    #[error(transparent)]
    Intent(#[from] IntentError),
    #[error("operation {index} failed, transaction rolled back: {source}")]
    Execution {
        index: usize,
        #[source]
        source: ExecutionError,
    },
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error(
        "transaction failed ({cause}) and rollback did not complete: {rollback}; \
         the directory may be partially modified and needs manual inspection"
    )]
    RollbackFailed {
        cause: Box<Error>,
        #[source]
        rollback: RollbackError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// True when the filesystem may be left in a mixed state.
    pub fn needs_manual_recovery(&self) -> bool {
        matches!(self, Error::RollbackFailed { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
