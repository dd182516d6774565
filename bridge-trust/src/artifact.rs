//! The binary under certification and the stages it has passed.
//!
//! Stage markers only ever move forward one step at a time:
//!
//! ```text
//! Unsigned → Signed → Packaged → Submitted(id) → Verdict(..) → Stapled
//! ```
//!
//! A failed step leaves the artifact on its last completed marker.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{io_err, TrustError};
use crate::submission::TrackingId;

/// One step of the trust pipeline, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Sign,
    Verify,
    Package,
    Submit,
    Poll,
    Staple,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 6] = [
        PipelineStage::Sign,
        PipelineStage::Verify,
        PipelineStage::Package,
        PipelineStage::Submit,
        PipelineStage::Poll,
        PipelineStage::Staple,
    ];
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Sign => write!(f, "sign"),
            PipelineStage::Verify => write!(f, "verify"),
            PipelineStage::Package => write!(f, "package"),
            PipelineStage::Submit => write!(f, "submit"),
            PipelineStage::Poll => write!(f, "poll verdict"),
            PipelineStage::Staple => write!(f, "staple"),
        }
    }
}

/// Final word from the notarization authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    Success,
    Rejected { status: String },
    Unknown { status: String },
}

/// Progress marker recorded on a [`TrustArtifact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum TrustStage {
    Unsigned,
    Signed,
    Packaged { archive: PathBuf },
    Submitted { tracking_id: TrackingId },
    Verdict(Verdict),
    Stapled,
}

impl TrustStage {
    fn ordinal(&self) -> u8 {
        match self {
            TrustStage::Unsigned => 0,
            TrustStage::Signed => 1,
            TrustStage::Packaged { .. } => 2,
            TrustStage::Submitted { .. } => 3,
            TrustStage::Verdict(_) => 4,
            TrustStage::Stapled => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrustStage::Unsigned => "unsigned",
            TrustStage::Signed => "signed",
            TrustStage::Packaged { .. } => "packaged",
            TrustStage::Submitted { .. } => "submitted",
            TrustStage::Verdict(_) => "verdict",
            TrustStage::Stapled => "stapled",
        }
    }
}

/// A binary moving through signing and notarization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustArtifact {
    path: PathBuf,
    sha256: String,
    stages: Vec<TrustStage>,
}

impl TrustArtifact {
    /// Start tracking `path` at `Unsigned`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TrustError> {
        let path = path.into();
        let sha256 = content_hash(&path)?;
        Ok(Self {
            path,
            sha256,
            stages: vec![TrustStage::Unsigned],
        })
    }

    /// Track a binary that was signed and submitted in an earlier run, so
    /// its verdict can be collected and stapled.
    pub fn adopt_submitted(
        path: impl Into<PathBuf>,
        tracking_id: TrackingId,
    ) -> Result<Self, TrustError> {
        let path = path.into();
        let sha256 = content_hash(&path)?;
        Ok(Self {
            path,
            sha256,
            stages: vec![TrustStage::Submitted { tracking_id }],
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hex SHA-256 of the binary as of the last completed stage.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn stage(&self) -> &TrustStage {
        // `stages` is never empty: both constructors seed it.
        &self.stages[self.stages.len() - 1]
    }

    pub fn history(&self) -> &[TrustStage] {
        &self.stages
    }

    /// Submission id once the artifact has reached `Submitted`.
    pub fn tracking_id(&self) -> Option<&TrackingId> {
        self.stages.iter().find_map(|stage| match stage {
            TrustStage::Submitted { tracking_id } => Some(tracking_id),
            _ => None,
        })
    }

    /// Record `next`, which must be exactly one step past the current stage.
    pub(crate) fn advance(&mut self, next: TrustStage) -> Result<(), TrustError> {
        let current = self.stage();
        if next.ordinal() != current.ordinal() + 1 {
            return Err(TrustError::StageOrder {
                from: current.label(),
                to: next.label(),
            });
        }
        tracing::debug!(
            "{}: {} -> {}",
            self.path.display(),
            current.label(),
            next.label()
        );
        self.stages.push(next);
        Ok(())
    }

    /// Re-hash after a stage that rewrites the binary (sign, staple).
    pub(crate) fn refresh_identity(&mut self) -> Result<(), TrustError> {
        self.sha256 = content_hash(&self.path)?;
        Ok(())
    }
}

/// Hex SHA-256 of the file at `path`.
pub fn content_hash(path: &Path) -> Result<String, TrustError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => TrustError::NotFound {
            path: path.to_path_buf(),
        },
        _ => io_err(path, e),
    })?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| io_err(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}
