//! YAML configuration for `bridgectl`.
//!
//! # Storage layout
//!
//! ```text
//! ~/.bridge/
//!   config.yaml   (optional; every field has a default)
//! ```
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{
    LifecycleTimings, NotarizationTimings, RestartPolicy, ServiceName, DEFAULT_SERVICE_NAME,
};

/// Shortest poll interval accepted from the file. Zero would busy-loop the
/// supervisor and notary tools.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn poll_interval(secs: u64) -> Duration {
    Duration::from_secs(secs).max(MIN_POLL_INTERVAL)
}

// ---------------------------------------------------------------------------
// 1. Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    pub service: ServiceSection,
    pub lifecycle: LifecycleSection,
    pub trust: TrustSection,
}

/// What gets installed and how the supervisor runs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub name: ServiceName,
    pub executable: PathBuf,
    /// Config file handed to the bridge as `--config <path>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub run_at_load: bool,
    pub keep_alive: bool,
    pub throttle_interval_secs: u64,
}

impl Default for ServiceSection {
    fn default() -> Self {
        let restart = RestartPolicy::default();
        Self {
            name: ServiceName::from(DEFAULT_SERVICE_NAME),
            executable: PathBuf::from("/usr/local/bin/bridge"),
            config: None,
            working_dir: None,
            log_dir: None,
            user: None,
            run_at_load: restart.run_at_load,
            keep_alive: restart.keep_alive,
            throttle_interval_secs: restart.throttle_interval_secs,
        }
    }
}

impl ServiceSection {
    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            run_at_load: self.run_at_load,
            keep_alive: self.keep_alive,
            throttle_interval_secs: self.throttle_interval_secs,
        }
    }
}

/// Poll parameters for start/stop/restart, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSection {
    pub poll_interval_secs: u64,
    pub start_timeout_secs: u64,
    pub stop_timeout_secs: u64,
    pub restart_settle_secs: u64,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        let t = LifecycleTimings::default();
        Self {
            poll_interval_secs: t.poll_interval.as_secs(),
            start_timeout_secs: t.start_timeout.as_secs(),
            stop_timeout_secs: t.stop_timeout.as_secs(),
            restart_settle_secs: t.restart_settle.as_secs(),
        }
    }
}

impl LifecycleSection {
    pub fn timings(&self) -> LifecycleTimings {
        LifecycleTimings {
            poll_interval: poll_interval(self.poll_interval_secs),
            start_timeout: Duration::from_secs(self.start_timeout_secs),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            restart_settle: Duration::from_secs(self.restart_settle_secs),
        }
    }
}

/// Which notarization client to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotaryTool {
    #[default]
    Notarytool,
    Altool,
}

/// Signing identity and notarization credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustSection {
    /// Code-signing identity, e.g. `Developer ID Application: Example (TEAMID)`.
    pub identity: String,
    pub bundle_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apple_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Named credential stored in the keychain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keychain_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entitlements: Option<PathBuf>,
    pub notary_tool: NotaryTool,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for TrustSection {
    fn default() -> Self {
        let t = NotarizationTimings::default();
        Self {
            identity: String::new(),
            bundle_id: String::new(),
            apple_id: None,
            team_id: None,
            password: None,
            keychain_profile: None,
            entitlements: None,
            notary_tool: NotaryTool::default(),
            poll_interval_secs: t.poll_interval.as_secs(),
            timeout_secs: t.timeout.as_secs(),
        }
    }
}

impl TrustSection {
    pub fn timings(&self) -> NotarizationTimings {
        NotarizationTimings {
            poll_interval: poll_interval(self.poll_interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Paths
// ---------------------------------------------------------------------------

/// `<home>/.bridge/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".bridge").join("config.yaml")
}

// ---------------------------------------------------------------------------
// 3. Load / save
// ---------------------------------------------------------------------------

/// Load `<home>/.bridge/config.yaml`, falling back to defaults when absent.
///
/// Returns `ConfigError::Parse` (with path) if the YAML is malformed.
pub fn load_at(home: &Path) -> Result<BridgeConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        tracing::debug!("no config at {}; using defaults", path.display());
        return Ok(BridgeConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(BridgeConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<BridgeConfig, ConfigError> {
    load_at(&home()?)
}

/// Save the config atomically (`config.yaml.tmp` then rename).
pub fn save_at(home: &Path, config: &BridgeConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path_at(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid config path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(path)
}

/// Home directory of the invoking user.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
