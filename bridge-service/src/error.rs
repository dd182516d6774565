use std::path::PathBuf;
use std::time::Duration;

use bridge_core::ToolError;
use thiserror::Error;

/// Error surface for descriptor generation, supervisor calls, and lifecycle
/// transitions.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Install found a descriptor already on disk. Not a failure: the
    /// service is already in the requested state.
    #[error("service '{service}' is already installed ({path})")]
    AlreadyInstalled { service: String, path: PathBuf },

    #[error("service '{service}' is not installed (no descriptor at {path})")]
    NotInstalled { service: String, path: PathBuf },

    #[error("invalid service descriptor: {0}")]
    InvalidDescriptor(String),

    /// A supervisor command failed; `operation` names the lifecycle step.
    #[error("{operation} failed for service '{service}': {source}")]
    Supervisor {
        operation: &'static str,
        service: String,
        #[source]
        source: ToolError,
    },

    #[error("service '{service}' did not report running within {waited:?}")]
    StartTimeout { service: String, waited: Duration },

    #[error("service '{service}' was still running after {waited:?}")]
    StopTimeout { service: String, waited: Duration },

    #[error("{operation} of service '{service}' was cancelled")]
    Cancelled {
        operation: &'static str,
        service: String,
    },

    #[error("service supervision is not supported on this platform: {0}")]
    Unsupported(String),
}

impl ServiceError {
    /// True for outcomes that leave the service exactly as requested.
    pub fn is_noop(&self) -> bool {
        matches!(self, ServiceError::AlreadyInstalled { .. })
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ServiceError {
    ServiceError::Io {
        path: path.into(),
        source,
    }
}
