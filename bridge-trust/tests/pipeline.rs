//! Trust pipeline against scripted fake gateways.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rstest::rstest;
use tempfile::TempDir;

use bridge_core::{CancelToken, NotarizationTimings, ToolError, ToolOutput};
use bridge_trust::{
    archive_path, CodeSigningGateway, NotarizationGateway, NotarizationSubmission,
    NotaryCredential, Packager, PipelineStage, SigningOptions, TrackingId, TrustError,
    TrustPipeline, TrustSettings, TrustStage, Verdict,
};

const TRACKING: &str = "2efe2717-52ef-43a5-96dc-0797e4ca1041";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct Script {
    fail: Option<PipelineStage>,
    submit_response: String,
    statuses: VecDeque<&'static str>,
    fallback_status: &'static str,
    query_errors: u32,
    calls: Vec<&'static str>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            fail: None,
            submit_response: format!("Submission ID received\n  id: {TRACKING}\n"),
            statuses: VecDeque::new(),
            fallback_status: "Accepted",
            query_errors: 0,
            calls: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
struct Fake(Arc<Mutex<Script>>);

impl Fake {
    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }

    fn calls(&self) -> Vec<&'static str> {
        self.with(|s| s.calls.clone())
    }

    fn queries(&self) -> usize {
        self.calls().iter().filter(|c| **c == "query").count()
    }

    /// Record `call` and report whether `stage` is scripted to fail.
    fn enter(&self, call: &'static str, stage: PipelineStage) -> bool {
        self.with(|s| {
            s.calls.push(call);
            s.fail == Some(stage)
        })
    }
}

fn tool_failure(what: &str) -> ToolError {
    ToolError::Failed {
        program: "fake".into(),
        args: vec![what.into()],
        status: Some(1),
        diagnostic: format!("{what}: forced failure"),
    }
}

fn stdout(text: &str) -> ToolOutput {
    ToolOutput {
        stdout: text.to_string(),
        stderr: String::new(),
    }
}

impl CodeSigningGateway for Fake {
    fn sign(&self, binary: &Path, _identity: &str, _options: &SigningOptions) -> Result<ToolOutput, ToolError> {
        if self.enter("sign", PipelineStage::Sign) {
            return Err(tool_failure("sign"));
        }
        let mut contents = fs::read(binary).unwrap();
        contents.extend_from_slice(b"\n--signature--");
        fs::write(binary, contents).unwrap();
        Ok(ToolOutput::default())
    }

    fn verify(&self, _binary: &Path) -> Result<ToolOutput, ToolError> {
        if self.enter("verify", PipelineStage::Verify) {
            return Err(tool_failure("verify"));
        }
        Ok(stdout("valid on disk"))
    }
}

impl Packager for Fake {
    fn package(&self, binary: &Path, archive: &Path) -> Result<(), ToolError> {
        let fail = self.enter("package", PipelineStage::Package);
        // A failing packager may still leave a partial archive behind.
        fs::write(archive, fs::read(binary).unwrap()).unwrap();
        if fail {
            return Err(tool_failure("package"));
        }
        Ok(())
    }
}

impl NotarizationGateway for Fake {
    fn submit(&self, archive: &Path, _bundle_id: &str, _credential: &NotaryCredential) -> Result<ToolOutput, ToolError> {
        assert!(archive.is_file(), "archive must exist at submission");
        if self.enter("submit", PipelineStage::Submit) {
            return Err(tool_failure("submit"));
        }
        Ok(stdout(&self.with(|s| s.submit_response.clone())))
    }

    fn query(&self, tracking_id: &TrackingId, _credential: &NotaryCredential) -> Result<ToolOutput, ToolError> {
        assert_eq!(tracking_id.as_str(), TRACKING);
        if self.enter("query", PipelineStage::Poll) {
            return Ok(stdout("  status: Invalid\n"));
        }
        self.with(|s| {
            if s.query_errors > 0 {
                s.query_errors -= 1;
                return Err(tool_failure("query"));
            }
            let status = s.statuses.pop_front().unwrap_or(s.fallback_status);
            Ok(stdout(&format!("  id: {TRACKING}\n  status: {status}\n")))
        })
    }

    fn staple(&self, _binary: &Path) -> Result<ToolOutput, ToolError> {
        if self.enter("staple", PipelineStage::Staple) {
            return Err(tool_failure("staple"));
        }
        Ok(stdout("The staple and validate action worked!"))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn settings() -> TrustSettings {
    TrustSettings {
        identity: "Developer ID Application: Bridge Dev (TEAM1)".into(),
        bundle_id: "dev.bridge.agent".into(),
        credential: Some(NotaryCredential::Profile("ci".into())),
        signing: SigningOptions::default(),
        timings: NotarizationTimings {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(300),
        },
    }
}

fn pipeline(fake: &Fake, settings: TrustSettings) -> TrustPipeline<Fake, Fake, Fake> {
    TrustPipeline::new(fake.clone(), fake.clone(), fake.clone(), settings)
}

fn binary(tmp: &TempDir) -> PathBuf {
    let path = tmp.path().join("bridge");
    fs::write(&path, b"\x7fELF bridge build").unwrap();
    path
}

fn labels(history: &[TrustStage]) -> Vec<&'static str> {
    history.iter().map(TrustStage::label).collect()
}

// ---------------------------------------------------------------------------
// Full runs
// ---------------------------------------------------------------------------

#[test]
fn full_run_reaches_stapled_and_removes_archive() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let original = bridge_trust::artifact::content_hash(&bin).unwrap();
    let fake = Fake::default();

    let artifact = pipeline(&fake, settings()).run(&bin).unwrap();

    assert_eq!(artifact.stage(), &TrustStage::Stapled);
    assert_eq!(
        labels(artifact.history()),
        ["unsigned", "signed", "packaged", "submitted", "verdict", "stapled"]
    );
    assert_eq!(artifact.tracking_id(), Some(&TrackingId::from(TRACKING)));
    assert_ne!(artifact.sha256(), original, "identity refreshed after signing");
    assert_eq!(
        fake.calls(),
        ["sign", "verify", "package", "submit", "query", "staple"]
    );
    assert!(!archive_path(&bin).exists());
}

#[test]
fn stale_archive_is_replaced_then_removed() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    fs::write(archive_path(&bin), b"left over from a crashed run").unwrap();
    let fake = Fake::default();

    pipeline(&fake, settings()).run(&bin).unwrap();
    assert!(!archive_path(&bin).exists());
}

#[rstest]
#[case::sign(PipelineStage::Sign, "unsigned")]
#[case::verify(PipelineStage::Verify, "signed")]
#[case::package(PipelineStage::Package, "signed")]
#[case::submit(PipelineStage::Submit, "packaged")]
#[case::poll(PipelineStage::Poll, "verdict")]
#[case::staple(PipelineStage::Staple, "verdict")]
fn failure_at_any_stage_leaves_no_archive(
    #[case] stage: PipelineStage,
    #[case] left_at: &str,
) {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    fake.with(|s| s.fail = Some(stage));

    let failure = pipeline(&fake, settings()).run(&bin).unwrap_err();

    assert_eq!(failure.stage, stage);
    let artifact = failure.artifact.expect("artifact attached");
    assert_eq!(artifact.stage().label(), left_at);
    assert!(
        !archive_path(&bin).exists(),
        "archive left behind after {stage} failure"
    );
    assert!(!fake.calls().contains(&"staple") || stage == PipelineStage::Staple);
}

#[test]
fn verify_failure_after_signing_is_inconsistent_state() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    fake.with(|s| s.fail = Some(PipelineStage::Verify));

    let failure = pipeline(&fake, settings()).run(&bin).unwrap_err();
    match failure.error {
        TrustError::InconsistentState { path, diagnostic } => {
            assert_eq!(path, bin);
            assert_eq!(diagnostic, "verify: forced failure");
        }
        other => panic!("expected InconsistentState, got {other}"),
    }
}

#[test]
fn gateway_errors_carry_stage_and_diagnostic() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    fake.with(|s| s.fail = Some(PipelineStage::Submit));

    let failure = pipeline(&fake, settings()).run(&bin).unwrap_err();
    let message = failure.to_string();
    assert!(message.contains("submit failed"), "got: {message}");
    assert!(message.contains("submit: forced failure"), "got: {message}");
}

// ---------------------------------------------------------------------------
// Verdict polling
// ---------------------------------------------------------------------------

#[test]
fn in_progress_then_success_goes_on_to_staple() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    fake.with(|s| {
        s.statuses = std::iter::repeat("In Progress").take(10).collect();
        s.fallback_status = "Accepted";
    });

    let artifact = pipeline(&fake, settings()).run(&bin).unwrap();

    assert_eq!(artifact.stage(), &TrustStage::Stapled);
    assert_eq!(fake.queries(), 11);
    assert_eq!(fake.calls().last(), Some(&"staple"));
}

#[test]
fn invalid_verdict_fails_without_retry() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    fake.with(|s| s.fallback_status = "Invalid");

    let failure = pipeline(&fake, settings()).run(&bin).unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Poll);
    assert!(
        matches!(&failure.error, TrustError::Rejected { status, .. } if status == "Invalid"),
        "got: {}",
        failure.error
    );
    assert_eq!(fake.queries(), 1);
    assert!(!fake.calls().contains(&"staple"));
    let artifact = failure.artifact.unwrap();
    assert_eq!(
        artifact.stage(),
        &TrustStage::Verdict(Verdict::Rejected {
            status: "Invalid".into()
        })
    );
}

#[test]
fn unknown_status_keeps_polling_until_timeout() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    fake.with(|s| s.fallback_status = "Queued For Review");

    let failure = pipeline(&fake, settings()).run(&bin).unwrap_err();

    assert!(
        matches!(failure.error, TrustError::Timeout { .. }),
        "got: {}",
        failure.error
    );
    assert!(fake.queries() > 1, "only {} queries", fake.queries());
    assert!(!fake.calls().contains(&"staple"));
    assert_eq!(
        failure.artifact.unwrap().stage(),
        &TrustStage::Verdict(Verdict::Unknown {
            status: "Queued For Review".into()
        })
    );
}

#[test]
fn failed_status_queries_count_as_pending() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    fake.with(|s| s.query_errors = 3);

    let artifact = pipeline(&fake, settings()).run(&bin).unwrap();

    assert_eq!(artifact.stage(), &TrustStage::Stapled);
    assert_eq!(fake.queries(), 4);
}

#[test]
fn submit_response_without_id_is_protocol_error() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    fake.with(|s| s.submit_response = "Error: HTTP status code: 401. Unable to authenticate.".into());

    let failure = pipeline(&fake, settings()).run(&bin).unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Submit);
    assert!(
        matches!(failure.error, TrustError::Protocol { stage: PipelineStage::Submit, .. }),
        "got: {}",
        failure.error
    );
    assert!(!archive_path(&bin).exists());
}

#[test]
fn cancellation_while_polling_stops_and_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    fake.with(|s| s.fallback_status = "In Progress");

    let mut slow = settings();
    slow.timings = NotarizationTimings {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_secs(30),
    };
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        trigger.cancel();
    });

    let failure = pipeline(&fake, slow)
        .with_cancel(cancel)
        .run(&bin)
        .unwrap_err();
    handle.join().unwrap();

    assert!(
        matches!(failure.error, TrustError::Cancelled { stage: PipelineStage::Poll }),
        "got: {}",
        failure.error
    );
    assert!(!archive_path(&bin).exists());
}

// ---------------------------------------------------------------------------
// Configuration and inputs
// ---------------------------------------------------------------------------

#[test]
fn missing_credential_fails_before_any_tool_runs() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    let mut settings = settings();
    settings.credential = None;

    let failure = pipeline(&fake, settings).run(&bin).unwrap_err();

    assert!(
        matches!(failure.error, TrustError::Configuration(_)),
        "got: {}",
        failure.error
    );
    assert!(failure.artifact.is_none());
    assert!(fake.calls().is_empty());
}

#[test]
fn missing_identity_fails_before_any_tool_runs() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    let mut settings = settings();
    settings.identity = "  ".into();

    let failure = pipeline(&fake, settings).run(&bin).unwrap_err();

    assert!(matches!(failure.error, TrustError::Configuration(_)));
    assert!(fake.calls().is_empty());
}

#[test]
fn missing_binary_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let fake = Fake::default();

    let failure = pipeline(&fake, settings())
        .run(&tmp.path().join("nope"))
        .unwrap_err();

    assert!(matches!(failure.error, TrustError::NotFound { .. }));
    assert!(fake.calls().is_empty());
}

#[test]
fn binary_named_like_its_archive_is_refused_untouched() {
    let tmp = TempDir::new().unwrap();
    let bin = tmp.path().join("bridge.zip");
    fs::write(&bin, b"\x7fELF bridge build").unwrap();
    let fake = Fake::default();

    let failure = pipeline(&fake, settings()).run(&bin).unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Package);
    assert!(matches!(failure.error, TrustError::Configuration(_)), "got: {}", failure.error);
    assert!(failure.error.to_string().contains("bridge.zip"));
    assert_eq!(fs::read(&bin).unwrap(), b"\x7fELF bridge build");
    assert!(fake.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Single stages
// ---------------------------------------------------------------------------

#[test]
fn verdict_wait_stops_at_submission_deadline() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    fake.with(|s| s.fallback_status = "In Progress");

    let mut patient = settings();
    patient.timings.timeout = Duration::from_secs(30);
    let pipeline = pipeline(&fake, patient);

    let id = TrackingId::from(TRACKING);
    let mut artifact = bridge_trust::TrustArtifact::adopt_submitted(&bin, id.clone()).unwrap();
    let mut submission = NotarizationSubmission::new(id, Duration::ZERO);

    let started = std::time::Instant::now();
    let err = pipeline
        .await_verdict(&mut artifact, &mut submission)
        .unwrap_err();

    assert!(matches!(err, TrustError::Timeout { .. }), "got: {err}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(fake.queries(), 1);
    assert_eq!(artifact.stage().label(), "verdict");
}

#[test]
fn staple_requires_success_verdict() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    let pipeline = pipeline(&fake, settings());

    let mut artifact = bridge_trust::TrustArtifact::open(&bin).unwrap();
    let err = pipeline.staple(&mut artifact).unwrap_err();

    assert!(matches!(err, TrustError::StageOrder { .. }), "got: {err}");
    assert!(fake.calls().is_empty());
}

#[test]
fn staple_submitted_checks_status_first() {
    let tmp = TempDir::new().unwrap();
    let bin = binary(&tmp);
    let fake = Fake::default();
    let pipeline = pipeline(&fake, settings());

    fake.with(|s| s.statuses.push_back("In Progress"));
    let err = pipeline
        .staple_submitted(&bin, &TrackingId::from(TRACKING))
        .unwrap_err();
    assert!(matches!(err, TrustError::NotApproved { .. }), "got: {err}");

    let artifact = pipeline
        .staple_submitted(&bin, &TrackingId::from(TRACKING))
        .unwrap();
    assert_eq!(artifact.stage(), &TrustStage::Stapled);
    assert_eq!(fake.calls(), ["query", "query", "staple"]);
}

#[test]
fn query_status_reads_single_token() {
    let fake = Fake::default();
    fake.with(|s| s.statuses.push_back("In Progress"));
    let status = pipeline(&fake, settings())
        .query_status(&TrackingId::from(TRACKING))
        .unwrap();
    assert_eq!(status, bridge_trust::NotarizationStatus::InProgress);
}
