use std::path::{Path, PathBuf};

use bridge_core::ServiceName;

pub const BRIDGE_STDOUT_LOG: &str = "bridge.log";
pub const BRIDGE_STDERR_LOG: &str = "bridge-err.log";

pub fn bridge_root(home: &Path) -> PathBuf {
    home.join(".bridge")
}

pub fn logs_dir(home: &Path) -> PathBuf {
    bridge_root(home).join("logs")
}

pub fn stdout_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(BRIDGE_STDOUT_LOG)
}

pub fn stderr_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(BRIDGE_STDERR_LOG)
}

pub fn launch_agents_dir(home: &Path) -> PathBuf {
    home.join("Library").join("LaunchAgents")
}

pub fn launchd_plist_path(home: &Path, name: &ServiceName) -> PathBuf {
    launch_agents_dir(home).join(format!("{name}.plist"))
}

pub fn systemd_user_dir(home: &Path) -> PathBuf {
    home.join(".config").join("systemd").join("user")
}

pub fn systemd_unit_path(home: &Path, name: &ServiceName) -> PathBuf {
    systemd_user_dir(home).join(format!("{name}.service"))
}
