//! Sign → verify → package → submit → await verdict → staple.
//!
//! Configuration is validated before the first external call. The
//! submission archive is scratch data: it is removed on every exit path,
//! including failures and cancellation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use bridge_core::{poll_until, CancelToken, NotarizationTimings, PollOutcome, PollSchedule};

use crate::artifact::{PipelineStage, TrustArtifact, TrustStage, Verdict};
use crate::error::{io_err, TrustError};
use crate::gateway::{
    CodeSigningGateway, NotarizationGateway, NotaryCredential, Packager, SigningOptions,
};
use crate::response::{parse_status, parse_tracking_id};
use crate::submission::{NotarizationStatus, NotarizationSubmission, TrackingId};

/// Everything the pipeline needs besides the gateways.
#[derive(Debug, Clone)]
pub struct TrustSettings {
    pub identity: String,
    pub bundle_id: String,
    pub credential: Option<NotaryCredential>,
    pub signing: SigningOptions,
    pub timings: NotarizationTimings,
}

/// A pipeline run that stopped early.
///
/// `artifact` is `None` only when the binary could not be opened.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    pub stage: PipelineStage,
    pub artifact: Option<TrustArtifact>,
    #[source]
    pub error: TrustError,
}

/// Submission archive that deletes itself when dropped.
#[derive(Debug)]
pub struct ArchiveGuard {
    path: PathBuf,
}

impl ArchiveGuard {
    /// Reserve `path`, clearing any stale archive left there.
    fn claim(path: PathBuf) -> Result<Self, TrustError> {
        match fs::remove_file(&path) {
            Ok(()) => debug!("removed stale archive {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&path, e)),
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArchiveGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("removed archive {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove archive {}: {e}", self.path.display()),
        }
    }
}

fn at(stage: PipelineStage) -> impl Fn(TrustError) -> (PipelineStage, TrustError) {
    move |error| (stage, error)
}

/// Archive path for `binary`: same directory, stem plus `.zip`.
pub fn archive_path(binary: &Path) -> PathBuf {
    binary.with_extension("zip")
}

/// [`archive_path`], refusing a binary that would be its own archive.
fn distinct_archive_path(binary: &Path) -> Result<PathBuf, TrustError> {
    let archive = archive_path(binary);
    if archive == binary {
        return Err(TrustError::Configuration(format!(
            "{} already has the archive extension; rename the binary before certifying it",
            binary.display()
        )));
    }
    Ok(archive)
}

pub struct TrustPipeline<S, P, N> {
    signer: S,
    packager: P,
    notary: N,
    settings: TrustSettings,
    cancel: CancelToken,
}

impl<S, P, N> TrustPipeline<S, P, N>
where
    S: CodeSigningGateway,
    P: Packager,
    N: NotarizationGateway,
{
    pub fn new(signer: S, packager: P, notary: N, settings: TrustSettings) -> Self {
        Self {
            signer,
            packager,
            notary,
            settings,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &TrustSettings {
        &self.settings
    }

    /// Run every stage on `binary`.
    pub fn run(&self, binary: &Path) -> Result<TrustArtifact, PipelineFailure> {
        let early = |stage, error| PipelineFailure {
            stage,
            artifact: None,
            error,
        };

        self.require_identity().map_err(|e| early(PipelineStage::Sign, e))?;
        self.require_bundle_id().map_err(|e| early(PipelineStage::Submit, e))?;
        self.credential().map_err(|e| early(PipelineStage::Submit, e))?;
        distinct_archive_path(binary).map_err(|e| early(PipelineStage::Package, e))?;

        let mut artifact =
            TrustArtifact::open(binary).map_err(|e| early(PipelineStage::Sign, e))?;
        info!(
            "certifying {} (sha256 {})",
            artifact.path().display(),
            artifact.sha256()
        );

        match self.run_stages(&mut artifact) {
            Ok(()) => {
                info!("{} signed, notarized and stapled", artifact.path().display());
                Ok(artifact)
            }
            Err((stage, error)) => {
                warn!(
                    "{stage} failed; {} left at '{}'",
                    artifact.path().display(),
                    artifact.stage().label()
                );
                Err(PipelineFailure {
                    stage,
                    artifact: Some(artifact),
                    error,
                })
            }
        }
    }

    fn run_stages(&self, artifact: &mut TrustArtifact) -> Result<(), (PipelineStage, TrustError)> {
        self.sign(artifact).map_err(at(PipelineStage::Sign))?;
        self.verify(artifact).map_err(at(PipelineStage::Verify))?;
        let archive = self.package(artifact).map_err(at(PipelineStage::Package))?;
        let mut submission = self
            .submit(artifact, archive.path())
            .map_err(at(PipelineStage::Submit))?;
        drop(archive);
        self.await_verdict(artifact, &mut submission)
            .map_err(at(PipelineStage::Poll))?;
        self.staple(artifact).map_err(at(PipelineStage::Staple))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Sign in place and move to `Signed`.
    pub fn sign(&self, artifact: &mut TrustArtifact) -> Result<(), TrustError> {
        self.check_cancel(PipelineStage::Sign)?;
        let identity = self.require_identity()?;
        self.require_exists(artifact)?;

        let output = self
            .signer
            .sign(artifact.path(), identity, &self.settings.signing)
            .map_err(|source| TrustError::Gateway {
                stage: PipelineStage::Sign,
                source,
            })?;
        debug!("codesign: {}", output.combined());

        artifact.advance(TrustStage::Signed)?;
        artifact.refresh_identity()?;
        info!("signed {} as '{identity}'", artifact.path().display());
        Ok(())
    }

    /// Check the signature. A failure right after signing is reported as
    /// [`TrustError::InconsistentState`].
    pub fn verify(&self, artifact: &TrustArtifact) -> Result<(), TrustError> {
        self.check_cancel(PipelineStage::Verify)?;
        self.require_exists(artifact)?;

        match self.signer.verify(artifact.path()) {
            Ok(_) => {
                info!("signature on {} verified", artifact.path().display());
                Ok(())
            }
            Err(source) if artifact.stage() == &TrustStage::Signed => {
                Err(TrustError::InconsistentState {
                    path: artifact.path().to_path_buf(),
                    diagnostic: source.diagnostic(),
                })
            }
            Err(source) => Err(TrustError::Gateway {
                stage: PipelineStage::Verify,
                source,
            }),
        }
    }

    /// Build the submission archive next to the binary.
    pub fn package(&self, artifact: &mut TrustArtifact) -> Result<ArchiveGuard, TrustError> {
        self.check_cancel(PipelineStage::Package)?;
        self.require_exists(artifact)?;

        let archive = ArchiveGuard::claim(distinct_archive_path(artifact.path())?)?;
        self.packager
            .package(artifact.path(), archive.path())
            .map_err(|source| TrustError::Gateway {
                stage: PipelineStage::Package,
                source,
            })?;
        if !archive.path().is_file() {
            return Err(TrustError::Protocol {
                stage: PipelineStage::Package,
                detail: format!("no archive written at {}", archive.path().display()),
            });
        }

        artifact.advance(TrustStage::Packaged {
            archive: archive.path().to_path_buf(),
        })?;
        info!("packaged {}", archive.path().display());
        Ok(archive)
    }

    /// Upload the archive and record the tracking id.
    pub fn submit(
        &self,
        artifact: &mut TrustArtifact,
        archive: &Path,
    ) -> Result<NotarizationSubmission, TrustError> {
        self.check_cancel(PipelineStage::Submit)?;
        let bundle_id = self.require_bundle_id()?;
        let credential = self.credential()?;

        let output = self
            .notary
            .submit(archive, bundle_id, credential)
            .map_err(|source| TrustError::Gateway {
                stage: PipelineStage::Submit,
                source,
            })?;
        let text = output.combined();
        let tracking_id = parse_tracking_id(&text).ok_or_else(|| TrustError::Protocol {
            stage: PipelineStage::Submit,
            detail: format!("no submission id in response: {text}"),
        })?;

        artifact.advance(TrustStage::Submitted {
            tracking_id: tracking_id.clone(),
        })?;
        info!("submitted {} as {tracking_id}", archive.display());
        Ok(NotarizationSubmission::new(
            tracking_id,
            self.settings.timings.timeout,
        ))
    }

    /// Poll until the authority returns a terminal status or the
    /// submission's deadline passes.
    ///
    /// Only `success` and `invalid` end the wait. Failed or unreadable
    /// queries count as still pending.
    pub fn await_verdict(
        &self,
        artifact: &mut TrustArtifact,
        submission: &mut NotarizationSubmission,
    ) -> Result<(), TrustError> {
        let credential = self.credential()?;
        let tracking_id = submission.tracking_id.clone();
        let schedule = PollSchedule::new(
            self.settings.timings.poll_interval,
            submission.remaining(Utc::now()),
        );

        let outcome = poll_until(schedule, &self.cancel, |attempt| -> Result<_, TrustError> {
            let output = match self.notary.query(&tracking_id, credential) {
                Ok(output) => output,
                Err(e) => {
                    warn!("status query {attempt} for {tracking_id} failed: {e}");
                    return Ok(None);
                }
            };
            let Some(token) = parse_status(&output.combined()) else {
                warn!("status query {attempt} for {tracking_id}: no status in response");
                return Ok(None);
            };

            let status = NotarizationStatus::parse(&token);
            submission.record(status.clone());
            match status {
                NotarizationStatus::Success => Ok(Some(Verdict::Success)),
                NotarizationStatus::Invalid(status) => Ok(Some(Verdict::Rejected { status })),
                NotarizationStatus::InProgress => {
                    debug!("{tracking_id}: in progress (attempt {attempt})");
                    Ok(None)
                }
                NotarizationStatus::Other(token) => {
                    warn!("{tracking_id}: unrecognised status '{token}', still waiting");
                    Ok(None)
                }
            }
        })?;

        match outcome {
            PollOutcome::Ready(Verdict::Success) => {
                artifact.advance(TrustStage::Verdict(Verdict::Success))?;
                info!("{tracking_id} accepted");
                Ok(())
            }
            PollOutcome::Ready(verdict) => {
                let status = match &verdict {
                    Verdict::Rejected { status } | Verdict::Unknown { status } => status.clone(),
                    Verdict::Success => String::new(),
                };
                artifact.advance(TrustStage::Verdict(verdict))?;
                Err(TrustError::Rejected {
                    tracking_id,
                    status,
                })
            }
            PollOutcome::TimedOut { attempts, .. } => {
                let last = submission
                    .last_status
                    .as_ref()
                    .map_or_else(|| "none".to_string(), ToString::to_string);
                warn!("{tracking_id}: no verdict after {attempts} queries (last status: {last})");
                artifact.advance(TrustStage::Verdict(Verdict::Unknown { status: last }))?;
                Err(TrustError::Timeout {
                    tracking_id,
                    waited: schedule.timeout,
                })
            }
            PollOutcome::Cancelled { .. } => Err(TrustError::Cancelled {
                stage: PipelineStage::Poll,
            }),
        }
    }

    /// Attach the ticket. Requires a success verdict on the artifact.
    pub fn staple(&self, artifact: &mut TrustArtifact) -> Result<(), TrustError> {
        self.check_cancel(PipelineStage::Staple)?;
        if artifact.stage() != &TrustStage::Verdict(Verdict::Success) {
            return Err(TrustError::StageOrder {
                from: artifact.stage().label(),
                to: TrustStage::Stapled.label(),
            });
        }
        self.require_exists(artifact)?;

        self.notary
            .staple(artifact.path())
            .map_err(|source| TrustError::Gateway {
                stage: PipelineStage::Staple,
                source,
            })?;

        artifact.advance(TrustStage::Stapled)?;
        artifact.refresh_identity()?;
        info!("stapled {}", artifact.path().display());
        Ok(())
    }

    /// One status query, no waiting.
    pub fn query_status(&self, tracking_id: &TrackingId) -> Result<NotarizationStatus, TrustError> {
        let credential = self.credential()?;
        let output = self
            .notary
            .query(tracking_id, credential)
            .map_err(|source| TrustError::Gateway {
                stage: PipelineStage::Poll,
                source,
            })?;
        let text = output.combined();
        let token = parse_status(&text).ok_or_else(|| TrustError::Protocol {
            stage: PipelineStage::Poll,
            detail: format!("no status in response: {text}"),
        })?;
        Ok(NotarizationStatus::parse(&token))
    }

    /// Staple a binary submitted in an earlier run, once its submission
    /// reports success.
    pub fn staple_submitted(
        &self,
        binary: &Path,
        tracking_id: &TrackingId,
    ) -> Result<TrustArtifact, TrustError> {
        let mut artifact = TrustArtifact::adopt_submitted(binary, tracking_id.clone())?;
        match self.query_status(tracking_id)? {
            NotarizationStatus::Success => {}
            NotarizationStatus::Invalid(status) => {
                artifact.advance(TrustStage::Verdict(Verdict::Rejected {
                    status: status.clone(),
                }))?;
                return Err(TrustError::Rejected {
                    tracking_id: tracking_id.clone(),
                    status,
                });
            }
            pending => {
                return Err(TrustError::NotApproved {
                    tracking_id: tracking_id.clone(),
                    status: pending.to_string(),
                })
            }
        }
        artifact.advance(TrustStage::Verdict(Verdict::Success))?;
        self.staple(&mut artifact)?;
        Ok(artifact)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn require_identity(&self) -> Result<&str, TrustError> {
        let identity = self.settings.identity.trim();
        if identity.is_empty() {
            return Err(TrustError::Configuration(
                "no signing identity configured".to_string(),
            ));
        }
        Ok(identity)
    }

    fn require_bundle_id(&self) -> Result<&str, TrustError> {
        let bundle_id = self.settings.bundle_id.trim();
        if bundle_id.is_empty() {
            return Err(TrustError::Configuration(
                "no bundle id configured".to_string(),
            ));
        }
        Ok(bundle_id)
    }

    fn credential(&self) -> Result<&NotaryCredential, TrustError> {
        self.settings.credential.as_ref().ok_or_else(|| {
            TrustError::Configuration(
                "no notarization credential: set a password or a keychain profile".to_string(),
            )
        })
    }

    fn require_exists(&self, artifact: &TrustArtifact) -> Result<(), TrustError> {
        if !artifact.path().is_file() {
            return Err(TrustError::NotFound {
                path: artifact.path().to_path_buf(),
            });
        }
        Ok(())
    }

    fn check_cancel(&self, stage: PipelineStage) -> Result<(), TrustError> {
        if self.cancel.is_cancelled() {
            return Err(TrustError::Cancelled { stage });
        }
        Ok(())
    }
}
