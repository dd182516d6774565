//! Domain types shared by the lifecycle controller and the trust pipeline.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poll::PollSchedule;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// The unique name under which the bridge is registered with the supervisor
/// (launchd label / systemd unit stem).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceName(pub String);

impl ServiceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A name is usable as a descriptor file stem: non-empty, no path
    /// separators, no whitespace.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && !self.0.starts_with('.')
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@'))
    }
}

impl Default for ServiceName {
    fn default() -> Self {
        Self(DEFAULT_SERVICE_NAME.to_owned())
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

pub const DEFAULT_SERVICE_NAME: &str = "dev.bridge.agent";

// ---------------------------------------------------------------------------
// Service state
// ---------------------------------------------------------------------------

/// Observed state of the installed service.
///
/// Derived from a single supervisor query; never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    NotInstalled,
    InstalledStopped,
    Running,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::NotInstalled => write!(f, "not installed"),
            ServiceState::InstalledStopped => write!(f, "installed (stopped)"),
            ServiceState::Running => write!(f, "running"),
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// How the supervisor should keep the process alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    pub run_at_load: bool,
    pub keep_alive: bool,
    /// Minimum seconds between respawns.
    pub throttle_interval_secs: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            run_at_load: true,
            keep_alive: true,
            throttle_interval_secs: 10,
        }
    }
}

/// Everything the supervisor needs to launch and supervise the bridge.
///
/// Paths are absolute and resolved before a descriptor is built. A written
/// descriptor is never edited in place; changes go through uninstall and
/// install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: ServiceName,
    pub executable: PathBuf,
    /// Full argument vector, executable first.
    pub arguments: Vec<String>,
    pub working_dir: PathBuf,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub restart: RestartPolicy,
    /// Account the process runs as; `None` means the installing user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

// ---------------------------------------------------------------------------
// Timings
// ---------------------------------------------------------------------------

/// Poll parameters for run-state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimings {
    pub poll_interval: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    /// Pause between the stop and start halves of a restart.
    pub restart_settle: Duration,
}

impl LifecycleTimings {
    pub fn start_schedule(&self) -> PollSchedule {
        PollSchedule::new(self.poll_interval, self.start_timeout)
    }

    pub fn stop_schedule(&self) -> PollSchedule {
        PollSchedule::new(self.poll_interval, self.stop_timeout)
    }
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            start_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(30),
            restart_settle: Duration::from_secs(2),
        }
    }
}

/// Poll parameters for awaiting a notarization verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotarizationTimings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl NotarizationTimings {
    pub fn schedule(&self) -> PollSchedule {
        PollSchedule::new(self.poll_interval, self.timeout)
    }
}

impl Default for NotarizationTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_display_and_default() {
        assert_eq!(ServiceName::from("com.example.bridge").to_string(), "com.example.bridge");
        assert_eq!(ServiceName::default().as_str(), DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn service_name_rejects_path_like_values() {
        assert!(ServiceName::from("dev.bridge.agent").is_valid());
        assert!(ServiceName::from("bridge@1").is_valid());
        assert!(!ServiceName::from("").is_valid());
        assert!(!ServiceName::from("../etc/passwd").is_valid());
        assert!(!ServiceName::from("my bridge").is_valid());
    }

    #[test]
    fn service_state_serializes_snake_case() {
        let yaml = serde_yaml::to_string(&ServiceState::InstalledStopped).expect("serialize");
        assert_eq!(yaml.trim(), "installed_stopped");
    }

    #[test]
    fn default_timings_match_supervisor_contract() {
        let t = LifecycleTimings::default();
        assert_eq!(t.poll_interval, Duration::from_secs(1));
        assert_eq!(t.start_timeout, Duration::from_secs(30));
        assert_eq!(t.stop_timeout, Duration::from_secs(30));
        assert_eq!(t.restart_settle, Duration::from_secs(2));

        let n = NotarizationTimings::default();
        assert_eq!(n.poll_interval, Duration::from_secs(30));
        assert_eq!(n.timeout, Duration::from_secs(1800));
    }
}
