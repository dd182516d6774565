use std::path::{Path, PathBuf};

use bridge_core::{run_tool, ServiceName, ToolError};

use crate::descriptor::DescriptorFormat;
use crate::error::ServiceError;
use crate::paths::launchd_plist_path;
use crate::supervisor::{diagnostic_matches, Liveness, SupervisorGateway};

/// `launchctl` exit codes meaning "no such service" (ESRCH, 113).
const NOT_LOADED_CODES: &[i32] = &[3, 113];
const NOT_LOADED_PHRASES: &[&str] = &[
    "could not find specified service",
    "no such process",
    "not loaded",
];
/// EALREADY from `bootstrap` on a label that is already loaded.
const ALREADY_LOADED_CODES: &[i32] = &[37];
const ALREADY_LOADED_PHRASES: &[&str] = &["already loaded", "already in progress"];

/// launchd gateway for a per-user LaunchAgent in the `gui/<uid>` domain.
#[derive(Debug, Clone)]
pub struct Launchctl {
    home: PathBuf,
    domain: String,
}

impl Launchctl {
    pub fn new(home: impl Into<PathBuf>, domain: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            domain: domain.into(),
        }
    }

    pub fn for_current_user(home: &Path) -> Result<Self, ServiceError> {
        Ok(Self::new(home, launchctl_domain()?))
    }

    fn target(&self, name: &ServiceName) -> String {
        format!("{}/{}", self.domain, name)
    }
}

impl SupervisorGateway for Launchctl {
    fn format(&self) -> DescriptorFormat {
        DescriptorFormat::LaunchdPlist
    }

    fn descriptor_path(&self, name: &ServiceName) -> PathBuf {
        launchd_plist_path(&self.home, name)
    }

    fn register(&self, _name: &ServiceName, descriptor: &Path) -> Result<(), ToolError> {
        let plist = descriptor.display().to_string();
        match run_tool("launchctl", &["bootstrap", self.domain.as_str(), plist.as_str()]) {
            Ok(_) => Ok(()),
            Err(err) if diagnostic_matches(&err, ALREADY_LOADED_CODES, ALREADY_LOADED_PHRASES) => {
                tracing::debug!("{plist} already bootstrapped");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn deregister(&self, name: &ServiceName) -> Result<bool, ToolError> {
        let target = self.target(name);
        match run_tool("launchctl", &["bootout", target.as_str()]) {
            Ok(_) => Ok(true),
            Err(err) if diagnostic_matches(&err, NOT_LOADED_CODES, NOT_LOADED_PHRASES) => {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn start(&self, name: &ServiceName) -> Result<(), ToolError> {
        run_tool("launchctl", &["kickstart", self.target(name).as_str()]).map(|_| ())
    }

    /// Boots the job out of the domain. A plain `kill` is not enough:
    /// `KeepAlive.SuccessfulExit = false` respawns a job killed by a signal.
    /// The descriptor stays on disk and `start` bootstraps it again.
    fn stop(&self, name: &ServiceName) -> Result<(), ToolError> {
        self.deregister(name).map(|_| ())
    }

    fn query(&self, name: &ServiceName) -> Result<Liveness, ToolError> {
        let output = run_tool("launchctl", &["list"])?;
        Ok(parse_list(&output.stdout, name))
    }
}

/// Find `name` in `launchctl list` output (`PID\tStatus\tLabel` rows).
///
/// A numeric PID column means running; `-` means loaded but idle; no row
/// means not loaded.
pub fn parse_list(listing: &str, name: &ServiceName) -> Liveness {
    for line in listing.lines() {
        let mut columns = line.split_whitespace();
        let (Some(pid), Some(_status), Some(label)) =
            (columns.next(), columns.next(), columns.next())
        else {
            continue;
        };
        if label != name.as_str() {
            continue;
        }
        return match pid.parse::<u32>() {
            Ok(pid) if pid > 0 => Liveness::Running { pid },
            _ => Liveness::Loaded,
        };
    }
    Liveness::NotLoaded
}

fn launchctl_domain() -> Result<String, ServiceError> {
    let output = run_tool("id", &["-u"]).map_err(|source| ServiceError::Supervisor {
        operation: "resolve uid",
        service: "launchd".to_string(),
        source,
    })?;

    let uid = output.stdout.trim().to_string();
    if uid.is_empty() {
        return Err(ServiceError::Unsupported(
            "current uid from `id -u` was empty".to_string(),
        ));
    }
    Ok(format!("gui/{uid}"))
}
