//! Error types for toolstrap
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Vcs, Build)
//! - Batch failure reporting that names the work item which failed
//! - Process exit code mapping for the command line front end

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for toolstrap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for toolstrap
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller passed a value the operation cannot work with (zero workers, empty path)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A single work item's action failed
    ///
    /// `item` is the display form of the work item (a dependency `repo@rev` or a
    /// build target); `source` is the collaborator's error.
    #[error("{item}: {source}")]
    ActionFailed {
        /// The work item that failed
        item: String,
        /// The underlying error reported by the action
        source: Box<Error>,
    },

    /// A worker observed cancellation before it finished its range
    #[error("operation cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted by the runtime
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_workers")
        key: Option<String>,
    },

    /// Version control resolution or fetch failed
    #[error("vcs error: {0}")]
    Vcs(#[from] VcsError),

    /// Build invocation failed
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file could not be parsed
    #[error("failed to parse {path}: {source}")]
    TomlParse {
        /// The file that failed to parse
        path: PathBuf,
        /// The parser error
        source: toml::de::Error,
    },

    /// External tool execution failed (git, hg, go, ...)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, unsupported VCS)
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Wrap an action error so the batch result names the item that produced it
    pub fn action_failed(item: impl std::fmt::Display, source: Error) -> Self {
        Error::ActionFailed {
            item: item.to_string(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through `ActionFailed` wrappers
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::ActionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Name of the failed work item, if this error came out of a batch action
    pub fn failed_item(&self) -> Option<&str> {
        match self {
            Error::ActionFailed { item, .. } => Some(item),
            _ => None,
        }
    }
}

/// Version control errors
#[derive(Debug, Error)]
pub enum VcsError {
    /// No static rule or go-import meta tag matched the import path
    #[error("unrecognized import path {import_path}: {reason}")]
    UnresolvedImportPath {
        /// The import path that could not be resolved
        import_path: String,
        /// Why resolution failed
        reason: String,
    },

    /// The meta tag or path suffix named a VCS we do not drive
    #[error("unknown version control system {0:?}")]
    UnknownVcs(String),

    /// A VCS command exited unsuccessfully
    #[error("{command} failed in {dir}: {stderr}")]
    CommandFailed {
        /// The command line that was run (e.g. "git clone")
        command: String,
        /// Working directory of the command
        dir: PathBuf,
        /// Captured standard error
        stderr: String,
    },
}

/// Build errors
#[derive(Debug, Error)]
pub enum BuildError {
    /// `go build` exited unsuccessfully
    #[error("building {target} failed ({status}): {stderr}")]
    Failed {
        /// The build target import path
        target: String,
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },
}

/// Trait for mapping errors to process exit codes
pub trait ToExitCode {
    /// Get the exit code the command line front end should terminate with
    fn exit_code(&self) -> i32;

    /// Get a short machine-readable error code
    fn error_code(&self) -> &'static str;
}

impl ToExitCode for Error {
    fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) | Error::Config { .. } | Error::TomlParse { .. } => 2,
            Error::Cancelled => 130,
            Error::ActionFailed { source, .. } => source.exit_code(),
            _ => 1,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::ActionFailed { source, .. } => source.error_code(),
            Error::Cancelled => "cancelled",
            Error::WorkerPanicked(_) => "worker_panicked",
            Error::Config { .. } | Error::TomlParse { .. } => "config_error",
            Error::Vcs(_) => "vcs_error",
            Error::Build(_) => "build_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
        }
    }
}
