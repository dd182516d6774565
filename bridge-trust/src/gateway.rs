//! Seams between the pipeline and the platform's signing and notarization
//! tools. Gateways return raw tool output; interpretation happens in the
//! pipeline.

use std::path::{Path, PathBuf};

use bridge_core::{ToolError, ToolOutput};

use crate::error::TrustError;
use crate::submission::TrackingId;

/// Flags passed to the code-signing tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningOptions {
    pub hardened_runtime: bool,
    pub timestamp: bool,
    pub entitlements: Option<PathBuf>,
    /// Replace an existing signature.
    pub force: bool,
}

impl Default for SigningOptions {
    fn default() -> Self {
        Self {
            hardened_runtime: true,
            timestamp: true,
            entitlements: None,
            force: true,
        }
    }
}

/// How the notarization authority is authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotaryCredential {
    /// Account plus app-specific password.
    Password {
        account: String,
        secret: String,
        team_id: Option<String>,
    },
    /// Credentials stored in the keychain under a profile name.
    Profile(String),
}

impl NotaryCredential {
    /// Pick a credential from optional settings. A keychain profile wins
    /// over an explicit password; a password needs an account.
    pub fn resolve(
        account: Option<&str>,
        secret: Option<&str>,
        team_id: Option<&str>,
        profile: Option<&str>,
    ) -> Result<Self, TrustError> {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }

        if let Some(profile) = present(profile) {
            return Ok(NotaryCredential::Profile(profile.to_string()));
        }
        match (present(account), present(secret)) {
            (Some(account), Some(secret)) => Ok(NotaryCredential::Password {
                account: account.to_string(),
                secret: secret.to_string(),
                team_id: present(team_id).map(str::to_string),
            }),
            (None, Some(_)) => Err(TrustError::Configuration(
                "a notarization password needs an account (apple_id)".to_string(),
            )),
            _ => Err(TrustError::Configuration(
                "no notarization credential: set a password or a keychain profile".to_string(),
            )),
        }
    }
}

pub trait CodeSigningGateway {
    fn sign(
        &self,
        binary: &Path,
        identity: &str,
        options: &SigningOptions,
    ) -> Result<ToolOutput, ToolError>;

    fn verify(&self, binary: &Path) -> Result<ToolOutput, ToolError>;
}

pub trait Packager {
    /// Write a submission archive for `binary` at `archive`.
    fn package(&self, binary: &Path, archive: &Path) -> Result<(), ToolError>;
}

pub trait NotarizationGateway {
    fn submit(
        &self,
        archive: &Path,
        bundle_id: &str,
        credential: &NotaryCredential,
    ) -> Result<ToolOutput, ToolError>;

    fn query(
        &self,
        tracking_id: &TrackingId,
        credential: &NotaryCredential,
    ) -> Result<ToolOutput, ToolError>;

    /// Attach the notarization ticket to the binary.
    fn staple(&self, binary: &Path) -> Result<ToolOutput, ToolError>;
}

impl<G: CodeSigningGateway + ?Sized> CodeSigningGateway for Box<G> {
    fn sign(
        &self,
        binary: &Path,
        identity: &str,
        options: &SigningOptions,
    ) -> Result<ToolOutput, ToolError> {
        (**self).sign(binary, identity, options)
    }

    fn verify(&self, binary: &Path) -> Result<ToolOutput, ToolError> {
        (**self).verify(binary)
    }
}

impl<P: Packager + ?Sized> Packager for Box<P> {
    fn package(&self, binary: &Path, archive: &Path) -> Result<(), ToolError> {
        (**self).package(binary, archive)
    }
}

impl<N: NotarizationGateway + ?Sized> NotarizationGateway for Box<N> {
    fn submit(
        &self,
        archive: &Path,
        bundle_id: &str,
        credential: &NotaryCredential,
    ) -> Result<ToolOutput, ToolError> {
        (**self).submit(archive, bundle_id, credential)
    }

    fn query(
        &self,
        tracking_id: &TrackingId,
        credential: &NotaryCredential,
    ) -> Result<ToolOutput, ToolError> {
        (**self).query(tracking_id, credential)
    }

    fn staple(&self, binary: &Path) -> Result<ToolOutput, ToolError> {
        (**self).staple(binary)
    }
}
