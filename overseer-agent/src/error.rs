//! Error taxonomy for the overseer agent
//!
//! Four kinds of failure, each with its own recovery policy:
//! - Telemetry: the GPU query failed, the tick is skipped
//! - Transport: the chat platform is unreachable or answered with an error
//! - Persistence: subscriber state could not be read or written, never swallowed
//! - Configuration: required settings are missing, fatal at startup

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Shared `Result` alias for the agent.
pub type Result<T> = std::result::Result<T, OverseerError>;

#[derive(Debug, Error)]
pub enum OverseerError {
    #[error("telemetry failure: {details}")]
    Telemetry { details: String },

    #[error("transport failure in {operation}: {details}")]
    Transport {
        operation: &'static str,
        details: String,
    },

    #[error("persistence failure at {path}: {details}")]
    Persistence { path: PathBuf, details: String },

    #[error("configuration error: {details}")]
    Configuration { details: String },
}

impl OverseerError {
    pub fn telemetry(details: impl ToString) -> Self {
        Self::Telemetry {
            details: details.to_string(),
        }
    }

    pub fn transport(operation: &'static str, details: impl ToString) -> Self {
        Self::Transport {
            operation,
            details: details.to_string(),
        }
    }

    pub fn persistence(path: impl AsRef<Path>, details: impl ToString) -> Self {
        Self::Persistence {
            path: path.as_ref().to_path_buf(),
            details: details.to_string(),
        }
    }

    pub fn configuration(details: impl ToString) -> Self {
        Self::Configuration {
            details: details.to_string(),
        }
    }

    /// Whether the monitor loop may log this error and carry on with the next tick.
    ///
    /// Losing subscriber state silently or running without configuration is
    /// never acceptable, everything else is transient.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Telemetry { .. } | Self::Transport { .. })
    }
}
