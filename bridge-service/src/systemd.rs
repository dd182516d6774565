use std::path::{Path, PathBuf};

use bridge_core::{run_tool, ServiceName, ToolError};

use crate::descriptor::DescriptorFormat;
use crate::paths::systemd_unit_path;
use crate::supervisor::{diagnostic_matches, Liveness, SupervisorGateway};

/// `systemctl` exit codes for unknown or inactive units.
const NOT_LOADED_CODES: &[i32] = &[5];
const NOT_LOADED_PHRASES: &[&str] = &["not loaded", "does not exist", "not found"];

/// systemd gateway managing a user unit (`systemctl --user`).
#[derive(Debug, Clone)]
pub struct Systemctl {
    home: PathBuf,
}

impl Systemctl {
    pub fn user(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    fn unit(name: &ServiceName) -> String {
        format!("{name}.service")
    }

    fn systemctl(args: &[&str]) -> Result<String, ToolError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("--user");
        full.extend_from_slice(args);
        run_tool("systemctl", &full).map(|out| out.stdout)
    }
}

impl SupervisorGateway for Systemctl {
    fn format(&self) -> DescriptorFormat {
        DescriptorFormat::SystemdUnit
    }

    fn descriptor_path(&self, name: &ServiceName) -> PathBuf {
        systemd_unit_path(&self.home, name)
    }

    fn register(&self, name: &ServiceName, _descriptor: &Path) -> Result<(), ToolError> {
        Self::systemctl(&["daemon-reload"])?;
        Self::systemctl(&["enable", Self::unit(name).as_str()]).map(|_| ())
    }

    fn deregister(&self, name: &ServiceName) -> Result<bool, ToolError> {
        let was_loaded = match Self::systemctl(&["disable", Self::unit(name).as_str()]) {
            Ok(_) => true,
            Err(err) if diagnostic_matches(&err, NOT_LOADED_CODES, NOT_LOADED_PHRASES) => false,
            Err(err) => return Err(err),
        };
        if let Err(err) = Self::systemctl(&["daemon-reload"]) {
            tracing::debug!("daemon-reload after disable failed: {err}");
        }
        Ok(was_loaded)
    }

    fn start(&self, name: &ServiceName) -> Result<(), ToolError> {
        Self::systemctl(&["start", Self::unit(name).as_str()]).map(|_| ())
    }

    fn stop(&self, name: &ServiceName) -> Result<(), ToolError> {
        Self::systemctl(&["stop", Self::unit(name).as_str()]).map(|_| ())
    }

    fn query(&self, name: &ServiceName) -> Result<Liveness, ToolError> {
        let unit = Self::unit(name);
        let output = Self::systemctl(&[
            "show",
            unit.as_str(),
            "--property=LoadState",
            "--property=MainPID",
        ])?;
        Ok(parse_show(&output))
    }
}

/// Interpret `systemctl show -p LoadState -p MainPID` output.
pub fn parse_show(output: &str) -> Liveness {
    let mut load_state = None;
    let mut main_pid = 0u32;
    for line in output.lines() {
        match line.trim().split_once('=') {
            Some(("LoadState", value)) => load_state = Some(value.trim()),
            Some(("MainPID", value)) => main_pid = value.trim().parse().unwrap_or(0),
            _ => {}
        }
    }

    match load_state {
        None | Some("not-found") | Some("") => Liveness::NotLoaded,
        Some(_) if main_pid > 0 => Liveness::Running { pid: main_pid },
        Some(_) => Liveness::Loaded,
    }
}
