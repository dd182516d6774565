//! `bridgectl trust`: sign, notarize and staple a bridge binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use bridge_core::config::{NotaryTool, TrustSection};
use bridge_core::CancelToken;
use bridge_trust::tools::{default_packager, Altool, Codesign, Notarytool};
use bridge_trust::{
    NotarizationGateway, NotarizationStatus, NotaryCredential, Packager, SigningOptions,
    TrackingId, TrustArtifact, TrustPipeline, TrustSettings,
};

use super::load_config;

type Pipeline = TrustPipeline<Codesign, Box<dyn Packager>, Box<dyn NotarizationGateway>>;

#[derive(Subcommand, Debug)]
pub enum TrustCommand {
    /// Sign the binary and verify the new signature.
    Sign(BinaryArgs),
    /// Verify the binary's existing signature.
    Verify(BinaryArgs),
    /// Run the full pipeline: sign, verify, package, submit, wait, staple.
    Notarize(BinaryArgs),
    /// Staple a binary whose earlier submission has been accepted.
    Staple(StapleArgs),
    /// Query the status of a submission once.
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct BinaryArgs {
    /// Path to the bridge binary.
    pub binary: PathBuf,

    /// Signing identity (defaults to the configured identity).
    #[arg(long)]
    pub identity: Option<String>,
}

#[derive(Args, Debug)]
pub struct StapleArgs {
    /// Path to the bridge binary.
    pub binary: PathBuf,

    /// Tracking id returned when the binary was submitted.
    #[arg(long)]
    pub submission: String,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Tracking id returned on submission.
    pub tracking_id: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: TrustCommand, cancel: CancelToken) -> Result<()> {
    let (_home, config) = load_config()?;
    let trust = &config.trust;

    match command {
        TrustCommand::Sign(args) => {
            let pipeline = pipeline(trust, args.identity.as_deref(), None, cancel);
            let mut artifact = TrustArtifact::open(&args.binary)?;
            pipeline
                .sign(&mut artifact)
                .with_context(|| format!("failed to sign {}", args.binary.display()))?;
            pipeline.verify(&artifact)?;
            println!(
                "signed {} (sha256 {})",
                artifact.path().display(),
                artifact.sha256()
            );
        }
        TrustCommand::Verify(args) => {
            let pipeline = pipeline(trust, args.identity.as_deref(), None, cancel);
            let artifact = TrustArtifact::open(&args.binary)?;
            pipeline.verify(&artifact)?;
            println!("signature on {} is valid", artifact.path().display());
        }
        TrustCommand::Notarize(args) => {
            let credential = credential(trust)?;
            let pipeline = pipeline(trust, args.identity.as_deref(), Some(credential), cancel);
            match pipeline.run(&args.binary) {
                Ok(artifact) => println!(
                    "{} {} notarized and stapled (sha256 {})",
                    "✓".green().bold(),
                    artifact.path().display(),
                    artifact.sha256()
                ),
                Err(failure) => {
                    if let Some(artifact) = &failure.artifact {
                        eprintln!(
                            "{} {} left at stage '{}'",
                            "✗".red().bold(),
                            artifact.path().display(),
                            artifact.stage().label()
                        );
                        if let Some(id) = artifact.tracking_id() {
                            eprintln!("submission id: {id}");
                        }
                    }
                    let stage = failure.stage;
                    return Err(anyhow::Error::new(failure))
                        .context(format!("trust pipeline stopped at {stage}"));
                }
            }
        }
        TrustCommand::Staple(args) => {
            let credential = credential(trust)?;
            let pipeline = pipeline(trust, None, Some(credential), cancel);
            let artifact = pipeline
                .staple_submitted(&args.binary, &TrackingId::from(args.submission))
                .with_context(|| format!("failed to staple {}", args.binary.display()))?;
            println!("stapled {}", artifact.path().display());
        }
        TrustCommand::Status(args) => {
            let credential = credential(trust)?;
            let pipeline = pipeline(trust, None, Some(credential), cancel);
            let tracking_id = TrackingId::from(args.tracking_id);
            let status = pipeline
                .query_status(&tracking_id)
                .with_context(|| format!("failed to query submission {tracking_id}"))?;
            if args.json {
                let payload = serde_json::json!({
                    "tracking_id": tracking_id,
                    "status": status.to_string(),
                    "terminal": status.is_terminal(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to serialize status JSON")?
                );
            } else {
                println!("{tracking_id}: {}", status_label(&status));
            }
        }
    }

    Ok(())
}

fn pipeline(
    trust: &TrustSection,
    identity: Option<&str>,
    credential: Option<NotaryCredential>,
    cancel: CancelToken,
) -> Pipeline {
    let notary: Box<dyn NotarizationGateway> = match trust.notary_tool {
        NotaryTool::Notarytool => Box::new(Notarytool),
        NotaryTool::Altool => Box::new(Altool),
    };
    let settings = TrustSettings {
        identity: identity.unwrap_or(&trust.identity).to_string(),
        bundle_id: trust.bundle_id.clone(),
        credential,
        signing: SigningOptions {
            entitlements: trust.entitlements.clone(),
            ..SigningOptions::default()
        },
        timings: trust.timings(),
    };
    TrustPipeline::new(Codesign, default_packager(), notary, settings).with_cancel(cancel)
}

fn credential(trust: &TrustSection) -> Result<NotaryCredential> {
    let credential = NotaryCredential::resolve(
        trust.apple_id.as_deref(),
        trust.password.as_deref(),
        trust.team_id.as_deref(),
        trust.keychain_profile.as_deref(),
    )?;
    Ok(credential)
}

fn status_label(status: &NotarizationStatus) -> String {
    match status {
        NotarizationStatus::Success => "success".green().bold().to_string(),
        NotarizationStatus::Invalid(token) => token.red().bold().to_string(),
        NotarizationStatus::InProgress => "in progress".yellow().to_string(),
        NotarizationStatus::Other(token) => format!("{token} (unrecognised, still pending)"),
    }
}
