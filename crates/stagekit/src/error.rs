//! Error types for release building and staging.
//!
//! The release pipeline is fail-fast: every error here is fatal for the
//! release that produced it. Variants carry the diagnostic text of the
//! underlying tool so operators see the real cause, not a summary.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building or staging a release.
#[derive(Debug, Error)]
pub enum Error {
    /// A build tool (compiler or bundler) exited with a failure status
    #[error("{tool} build failed: {stderr}")]
    Build {
        /// Name of the tool that failed (e.g. "cargo")
        tool: String,
        /// Standard error output from the failed invocation
        stderr: String,
    },

    /// An expected field was absent while templating a config file
    #[error("config field '{field}' not found in {}", path.display())]
    Config {
        /// Name of the field that could not be rewritten
        field: String,
        /// Path of the config file being templated
        path: PathBuf,
    },

    /// A sensitive file was about to be placed with an unsafe mode
    #[error("refusing mode {mode:03o} for {}: group-write and world access are not allowed", path.display())]
    Permission {
        /// Destination path of the rejected placement
        path: PathBuf,
        /// The rejected mode bits
        mode: u32,
    },

    /// An artifact required by the fixed layout is missing
    #[error("artifact '{name}' missing from {}", dir.display())]
    MissingArtifact {
        /// File name of the missing artifact
        name: String,
        /// Directory that was expected to contain it
        dir: PathBuf,
    },

    /// A tool could not be spawned at all
    #[error("failed to run {tool}: {source}")]
    Spawn {
        /// Name of the tool that could not be started
        tool: String,
        /// The underlying spawn error
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for release operations.
pub type Result<T> = std::result::Result<T, Error>;
