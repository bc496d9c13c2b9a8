//! Error types for civibuild-check

use thiserror::Error;

/// Errors that can occur while running the provisioning check
#[derive(Error, Debug)]
pub enum CheckError {
    /// The provisioning tool ran to completion and reported failure
    #[error("expected exit status 0, got {status}")]
    ToolFailed {
        /// Raw exit status (`-1` when the child was killed by a signal)
        status: i32,
        /// Captured stderr, kept as diagnostic context only
        stderr: String,
    },

    /// The provisioning tool could not be started (usually not installed)
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The bounded wait elapsed before the tool exited
    #[error("provisioning tool timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    /// An instance with the target name was already present
    #[error("instance `{name}` already exists; refusing to provision over it")]
    InstanceExists { name: String },

    /// The instance could not be destroyed after a passing check
    #[error("failed to destroy instance `{name}`: {reason}")]
    Teardown { name: String, reason: String },

    /// Invalid check configuration
    #[error("invalid check configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CheckError {
    /// Short machine-readable name for the error kind, used in log events.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckError::ToolFailed { .. } => "tool_failed",
            CheckError::Spawn { .. } => "spawn",
            CheckError::Timeout { .. } => "timeout",
            CheckError::InstanceExists { .. } => "instance_exists",
            CheckError::Teardown { .. } => "teardown",
            CheckError::InvalidConfig(_) => "invalid_config",
            CheckError::Io(_) => "io",
            CheckError::Json(_) => "json",
        }
    }
}

/// Result type for check operations.
pub type CheckResult<T> = std::result::Result<T, CheckError>;
