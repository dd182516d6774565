//! OS service supervisor gateway.
//!
//! One capability interface over launchd and systemd. The lifecycle
//! controller only ever talks to a [`SupervisorGateway`]; the platform
//! implementation is picked once by [`platform_gateway`].

use std::path::{Path, PathBuf};

use bridge_core::{ServiceName, ToolError};

use crate::descriptor::DescriptorFormat;
use crate::error::ServiceError;

/// What the supervisor currently knows about a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Loaded and a live process id is listed.
    Running { pid: u32 },
    /// Loaded, no live process.
    Loaded,
    /// The supervisor has no record of the service.
    NotLoaded,
}

impl Liveness {
    pub fn is_running(&self) -> bool {
        matches!(self, Liveness::Running { .. })
    }
}

/// Commands issued to the platform supervisor.
///
/// Start and stop only *request* a change; callers confirm the effect by
/// polling [`SupervisorGateway::query`].
pub trait SupervisorGateway {
    /// Descriptor dialect this supervisor reads.
    fn format(&self) -> DescriptorFormat;

    /// Fixed, platform-defined descriptor location for `name`.
    fn descriptor_path(&self, name: &ServiceName) -> PathBuf;

    /// Load the descriptor at `descriptor` into the supervisor.
    fn register(&self, name: &ServiceName, descriptor: &Path) -> Result<(), ToolError>;

    /// Unload `name`. Returns `false` when it was not loaded to begin with.
    fn deregister(&self, name: &ServiceName) -> Result<bool, ToolError>;

    fn start(&self, name: &ServiceName) -> Result<(), ToolError>;

    fn stop(&self, name: &ServiceName) -> Result<(), ToolError>;

    /// Single liveness query.
    fn query(&self, name: &ServiceName) -> Result<Liveness, ToolError>;
}

impl<G: SupervisorGateway + ?Sized> SupervisorGateway for Box<G> {
    fn format(&self) -> DescriptorFormat {
        (**self).format()
    }

    fn descriptor_path(&self, name: &ServiceName) -> PathBuf {
        (**self).descriptor_path(name)
    }

    fn register(&self, name: &ServiceName, descriptor: &Path) -> Result<(), ToolError> {
        (**self).register(name, descriptor)
    }

    fn deregister(&self, name: &ServiceName) -> Result<bool, ToolError> {
        (**self).deregister(name)
    }

    fn start(&self, name: &ServiceName) -> Result<(), ToolError> {
        (**self).start(name)
    }

    fn stop(&self, name: &ServiceName) -> Result<(), ToolError> {
        (**self).stop(name)
    }

    fn query(&self, name: &ServiceName) -> Result<Liveness, ToolError> {
        (**self).query(name)
    }
}

/// Supervisor for the running platform, scoped to the user at `home`.
#[cfg(target_os = "macos")]
pub fn platform_gateway(home: &Path) -> Result<Box<dyn SupervisorGateway>, ServiceError> {
    Ok(Box::new(crate::launchd::Launchctl::for_current_user(home)?))
}

/// Supervisor for the running platform, scoped to the user at `home`.
#[cfg(target_os = "linux")]
pub fn platform_gateway(home: &Path) -> Result<Box<dyn SupervisorGateway>, ServiceError> {
    Ok(Box::new(crate::systemd::Systemctl::user(home)))
}

/// Supervisor for the running platform, scoped to the user at `home`.
#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn platform_gateway(_home: &Path) -> Result<Box<dyn SupervisorGateway>, ServiceError> {
    Err(ServiceError::Unsupported(std::env::consts::OS.to_string()))
}

/// True when a failed supervisor command exited with one of `codes` or its
/// output mentions one of `phrases`.
pub(crate) fn diagnostic_matches(err: &ToolError, codes: &[i32], phrases: &[&str]) -> bool {
    match err {
        ToolError::Spawn { .. } => false,
        ToolError::Failed {
            status, diagnostic, ..
        } => {
            let lower = diagnostic.to_ascii_lowercase();
            status.is_some_and(|code| codes.contains(&code))
                || phrases.iter().any(|phrase| lower.contains(phrase))
        }
    }
}
