//! Gateways backed by the macOS command-line tools.

use std::path::Path;

use bridge_core::{run_tool, ToolError, ToolOutput};

use crate::gateway::{
    CodeSigningGateway, NotarizationGateway, NotaryCredential, Packager, SigningOptions,
};
use crate::submission::TrackingId;

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// codesign
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Codesign;

impl Codesign {
    pub fn sign_args(binary: &Path, identity: &str, options: &SigningOptions) -> Vec<String> {
        let mut args = vec!["--sign".to_string(), identity.to_string()];
        if options.force {
            args.push("--force".into());
        }
        if options.hardened_runtime {
            args.extend(["--options".to_string(), "runtime".to_string()]);
        }
        if options.timestamp {
            args.push("--timestamp".into());
        }
        if let Some(entitlements) = &options.entitlements {
            args.extend(["--entitlements".to_string(), path_arg(entitlements)]);
        }
        args.push(path_arg(binary));
        args
    }

    pub fn verify_args(binary: &Path) -> Vec<String> {
        vec![
            "--verify".into(),
            "--strict".into(),
            "--verbose=2".into(),
            path_arg(binary),
        ]
    }
}

impl CodeSigningGateway for Codesign {
    fn sign(
        &self,
        binary: &Path,
        identity: &str,
        options: &SigningOptions,
    ) -> Result<ToolOutput, ToolError> {
        run_tool("codesign", &Self::sign_args(binary, identity, options))
    }

    fn verify(&self, binary: &Path) -> Result<ToolOutput, ToolError> {
        run_tool("codesign", &Self::verify_args(binary))
    }
}

// ---------------------------------------------------------------------------
// Packagers
// ---------------------------------------------------------------------------

/// `ditto -c -k --keepParent`, the archive format the notary service expects.
#[derive(Debug, Clone, Copy, Default)]
pub struct DittoPackager;

impl Packager for DittoPackager {
    fn package(&self, binary: &Path, archive: &Path) -> Result<(), ToolError> {
        let args = [
            "-c".to_string(),
            "-k".to_string(),
            "--keepParent".to_string(),
            path_arg(binary),
            path_arg(archive),
        ];
        run_tool("ditto", &args).map(|_| ())
    }
}

/// Plain `zip`, for hosts without `ditto`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackager;

impl Packager for ZipPackager {
    fn package(&self, binary: &Path, archive: &Path) -> Result<(), ToolError> {
        let args = ["-j".to_string(), "-q".to_string(), path_arg(archive), path_arg(binary)];
        run_tool("zip", &args).map(|_| ())
    }
}

/// `ditto` on macOS, `zip` elsewhere.
pub fn default_packager() -> Box<dyn Packager> {
    if cfg!(target_os = "macos") {
        Box::new(DittoPackager)
    } else {
        Box::new(ZipPackager)
    }
}

// ---------------------------------------------------------------------------
// Notarization back-ends
// ---------------------------------------------------------------------------

fn staple_args(binary: &Path) -> Vec<String> {
    vec!["stapler".into(), "staple".into(), path_arg(binary)]
}

/// `xcrun notarytool`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Notarytool;

impl Notarytool {
    fn credential_args(credential: &NotaryCredential) -> Vec<String> {
        match credential {
            NotaryCredential::Profile(name) => vec!["--keychain-profile".into(), name.clone()],
            NotaryCredential::Password {
                account,
                secret,
                team_id,
            } => {
                let mut args = vec![
                    "--apple-id".into(),
                    account.clone(),
                    "--password".into(),
                    secret.clone(),
                ];
                if let Some(team) = team_id {
                    args.extend(["--team-id".to_string(), team.clone()]);
                }
                args
            }
        }
    }

    pub fn submit_args(archive: &Path, credential: &NotaryCredential) -> Vec<String> {
        let mut args = vec!["notarytool".into(), "submit".into(), path_arg(archive)];
        args.extend(Self::credential_args(credential));
        args
    }

    pub fn info_args(tracking_id: &TrackingId, credential: &NotaryCredential) -> Vec<String> {
        let mut args = vec![
            "notarytool".into(),
            "info".into(),
            tracking_id.to_string(),
        ];
        args.extend(Self::credential_args(credential));
        args
    }
}

impl NotarizationGateway for Notarytool {
    fn submit(
        &self,
        archive: &Path,
        bundle_id: &str,
        credential: &NotaryCredential,
    ) -> Result<ToolOutput, ToolError> {
        // notarytool identifies the upload by its contents; the bundle id
        // is only recorded here.
        tracing::debug!("submitting {} for {bundle_id}", archive.display());
        run_tool("xcrun", &Self::submit_args(archive, credential))
    }

    fn query(
        &self,
        tracking_id: &TrackingId,
        credential: &NotaryCredential,
    ) -> Result<ToolOutput, ToolError> {
        run_tool("xcrun", &Self::info_args(tracking_id, credential))
    }

    fn staple(&self, binary: &Path) -> Result<ToolOutput, ToolError> {
        run_tool("xcrun", &staple_args(binary))
    }
}

/// Legacy `xcrun altool`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Altool;

impl Altool {
    fn credential_args(credential: &NotaryCredential) -> Vec<String> {
        match credential {
            NotaryCredential::Profile(name) => vec![
                "--password".into(),
                format!("@keychain:{name}"),
            ],
            NotaryCredential::Password {
                account,
                secret,
                team_id,
            } => {
                let mut args = vec![
                    "--username".into(),
                    account.clone(),
                    "--password".into(),
                    secret.clone(),
                ];
                if let Some(team) = team_id {
                    args.extend(["--asc-provider".to_string(), team.clone()]);
                }
                args
            }
        }
    }

    pub fn submit_args(
        archive: &Path,
        bundle_id: &str,
        credential: &NotaryCredential,
    ) -> Vec<String> {
        let mut args = vec![
            "altool".into(),
            "--notarize-app".into(),
            "--primary-bundle-id".into(),
            bundle_id.to_string(),
            "--file".into(),
            path_arg(archive),
        ];
        args.extend(Self::credential_args(credential));
        args
    }

    pub fn info_args(tracking_id: &TrackingId, credential: &NotaryCredential) -> Vec<String> {
        let mut args = vec![
            "altool".into(),
            "--notarization-info".into(),
            tracking_id.to_string(),
        ];
        args.extend(Self::credential_args(credential));
        args
    }
}

impl NotarizationGateway for Altool {
    fn submit(
        &self,
        archive: &Path,
        bundle_id: &str,
        credential: &NotaryCredential,
    ) -> Result<ToolOutput, ToolError> {
        run_tool("xcrun", &Self::submit_args(archive, bundle_id, credential))
    }

    fn query(
        &self,
        tracking_id: &TrackingId,
        credential: &NotaryCredential,
    ) -> Result<ToolOutput, ToolError> {
        run_tool("xcrun", &Self::info_args(tracking_id, credential))
    }

    fn staple(&self, binary: &Path) -> Result<ToolOutput, ToolError> {
        run_tool("xcrun", &staple_args(binary))
    }
}
