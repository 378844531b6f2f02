//! Error types for kinematic synthesis.

use thiserror::Error;

/// Errors that can occur during kinematic synthesis.
#[derive(Error, Debug)]
pub enum KinematicsError {
    /// No mate joins a tree edge in either orientation.
    #[error("no mate joins {parent} and {child} in either orientation")]
    MissingTopology {
        /// Parent occurrence.
        parent: String,
        /// Child occurrence.
        child: String,
    },

    /// A tree node has no part record.
    #[error("tree node {0} has no part record")]
    MissingPart(String),

    /// A mate frame cannot be inverted.
    #[error("mate {0} has a singular coordinate frame")]
    SingularFrame(String),

    /// Two outputs claimed the same name.
    #[error("duplicate {kind} name: {name}")]
    DuplicateName {
        /// `"body"` or `"joint"`.
        kind: &'static str,
        /// The contested name.
        name: String,
    },

    /// A synthesis task panicked or was cancelled.
    #[error("synthesis task failed: {0}")]
    TaskFailed(String),

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for synthesis operations.
pub type Result<T> = std::result::Result<T, KinematicsError>;
