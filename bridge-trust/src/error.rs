use std::path::PathBuf;
use std::time::Duration;

use bridge_core::ToolError;
use thiserror::Error;

use crate::artifact::PipelineStage;
use crate::submission::TrackingId;

/// Failures of the signing and notarization pipeline.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Missing identity, bundle id or notarization credential. Raised
    /// before any external tool runs.
    #[error("trust configuration error: {0}")]
    Configuration(String),

    #[error("binary not found: {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external tool failed; carries its verbatim diagnostic.
    #[error("{stage} failed: {source}")]
    Gateway {
        stage: PipelineStage,
        #[source]
        source: ToolError,
    },

    /// A tool succeeded but its output could not be understood.
    #[error("{stage} returned an unexpected response: {detail}")]
    Protocol { stage: PipelineStage, detail: String },

    #[error("no verdict for submission {tracking_id} within {waited:?}")]
    Timeout {
        tracking_id: TrackingId,
        waited: Duration,
    },

    #[error("submission {tracking_id} was rejected (status: {status})")]
    Rejected {
        tracking_id: TrackingId,
        status: String,
    },

    /// Single status query for a submission that has no verdict yet.
    #[error("submission {tracking_id} is not approved yet (status: {status})")]
    NotApproved {
        tracking_id: TrackingId,
        status: String,
    },

    /// Signing reported success but the signature does not verify.
    #[error("signature on {path} does not verify after signing: {diagnostic}")]
    InconsistentState { path: PathBuf, diagnostic: String },

    #[error("{stage} was cancelled")]
    Cancelled { stage: PipelineStage },

    #[error("cannot move artifact from {from} to {to}")]
    StageOrder {
        from: &'static str,
        to: &'static str,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TrustError {
    TrustError::Io {
        path: path.into(),
        source,
    }
}
