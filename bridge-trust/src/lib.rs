//! Binary trust pipeline: sign, verify, package, notarize, staple.
//!
//! - [`artifact`]: the binary under certification and its stage markers
//! - [`gateway`]: signing, packaging and notarization seams
//! - [`tools`]: `codesign`, `ditto`/`zip`, `notarytool`, `altool` back-ends
//! - [`pipeline`]: stage orchestration with archive cleanup
//! - [`response`]: parsing of notarization tool output

pub mod artifact;
mod error;
pub mod gateway;
pub mod pipeline;
pub mod response;
pub mod submission;
pub mod tools;

pub use artifact::{PipelineStage, TrustArtifact, TrustStage, Verdict};
pub use error::TrustError;
pub use gateway::{
    CodeSigningGateway, NotarizationGateway, NotaryCredential, Packager, SigningOptions,
};
pub use pipeline::{archive_path, ArchiveGuard, PipelineFailure, TrustPipeline, TrustSettings};
pub use submission::{NotarizationStatus, NotarizationSubmission, TrackingId};
