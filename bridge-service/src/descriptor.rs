//! Service descriptor generation.
//!
//! [`build`] resolves a [`DescriptorRequest`] into a [`ServiceDescriptor`]
//! (absolute, symlink-free paths; log directory created), and [`render`]
//! expands it into the text the platform supervisor reads. Rendering is a
//! pure function of the descriptor.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bridge_core::{RestartPolicy, ServiceDescriptor, ServiceName};

use crate::error::{io_err, ServiceError};
use crate::paths::{stderr_log_path, stdout_log_path};

/// Flag the bridge accepts for its own configuration file.
pub const CONFIG_FLAG: &str = "--config";

/// On-disk descriptor dialect understood by a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    /// launchd property list (macOS LaunchAgent).
    LaunchdPlist,
    /// systemd unit file.
    SystemdUnit,
}

/// Caller-supplied inputs for a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRequest {
    pub name: ServiceName,
    pub executable: PathBuf,
    /// `None` or an empty path means the bridge runs without `--config`.
    pub config: Option<PathBuf>,
    /// Defaults to the executable's directory.
    pub working_dir: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub user: Option<String>,
    pub restart: RestartPolicy,
}

impl DescriptorRequest {
    pub fn new(name: ServiceName, executable: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            name,
            executable: executable.into(),
            config: None,
            working_dir: None,
            log_dir: log_dir.into(),
            user: None,
            restart: RestartPolicy::default(),
        }
    }
}

/// Resolve `request` into a descriptor, creating the log directory.
pub fn build(request: &DescriptorRequest) -> Result<ServiceDescriptor, ServiceError> {
    if !request.name.is_valid() {
        return Err(ServiceError::InvalidDescriptor(format!(
            "service name '{}' is not a valid identifier",
            request.name
        )));
    }

    let executable = resolve(&request.executable, "executable")?;

    let working_dir = match &request.working_dir {
        Some(dir) => resolve(dir, "working directory")?,
        None => executable
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                ServiceError::InvalidDescriptor(format!(
                    "executable {} has no parent directory",
                    executable.display()
                ))
            })?,
    };

    if !request.log_dir.is_absolute() {
        return Err(ServiceError::InvalidDescriptor(format!(
            "log directory must be absolute: {}",
            request.log_dir.display()
        )));
    }
    fs::create_dir_all(&request.log_dir).map_err(|e| io_err(&request.log_dir, e))?;
    let log_dir = resolve(&request.log_dir, "log directory")?;

    let mut arguments = vec![executable.display().to_string()];
    if let Some(config) = request.config.as_ref().filter(|p| !p.as_os_str().is_empty()) {
        let config = resolve(config, "config")?;
        arguments.push(CONFIG_FLAG.to_string());
        arguments.push(config.display().to_string());
    }

    Ok(ServiceDescriptor {
        name: request.name.clone(),
        executable,
        arguments,
        working_dir,
        stdout_path: stdout_log_path(&log_dir),
        stderr_path: stderr_log_path(&log_dir),
        restart: request.restart.clone(),
        user: request.user.clone().filter(|u| !u.is_empty()),
    })
}

/// Render `descriptor` in the given dialect.
pub fn render(descriptor: &ServiceDescriptor, format: DescriptorFormat) -> String {
    match format {
        DescriptorFormat::LaunchdPlist => generate_plist(descriptor),
        DescriptorFormat::SystemdUnit => generate_unit(descriptor),
    }
}

/// Write `contents` to `path` via `<path>.tmp` + rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), ServiceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Generate a launchd plist.
pub fn generate_plist(d: &ServiceDescriptor) -> String {
    let arguments: String = d
        .arguments
        .iter()
        .map(|arg| format!("    <string>{}</string>\n", xml_escape(arg)))
        .collect();

    // KeepAlive only on unsuccessful exit, so a requested stop sticks.
    let keep_alive = if d.restart.keep_alive {
        "<dict>\n    <key>SuccessfulExit</key>\n    <false/>\n  </dict>"
    } else {
        "<false/>"
    };

    let user = d
        .user
        .as_deref()
        .map(|u| format!("  <key>UserName</key>\n  <string>{}</string>\n", xml_escape(u)))
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
{arguments}  </array>
  <key>WorkingDirectory</key>
  <string>{working_dir}</string>
  <key>RunAtLoad</key>
  {run_at_load}
  <key>KeepAlive</key>
  {keep_alive}
  <key>ThrottleInterval</key>
  <integer>{throttle}</integer>
  <key>StandardOutPath</key>
  <string>{stdout}</string>
  <key>StandardErrorPath</key>
  <string>{stderr}</string>
{user}</dict>
</plist>
"#,
        label = xml_escape(d.name.as_str()),
        arguments = arguments,
        working_dir = xml_escape(&d.working_dir.display().to_string()),
        run_at_load = if d.restart.run_at_load { "<true/>" } else { "<false/>" },
        keep_alive = keep_alive,
        throttle = d.restart.throttle_interval_secs,
        stdout = xml_escape(&d.stdout_path.display().to_string()),
        stderr = xml_escape(&d.stderr_path.display().to_string()),
        user = user,
    )
}

/// Generate a systemd unit.
pub fn generate_unit(d: &ServiceDescriptor) -> String {
    let exec_start = d
        .arguments
        .iter()
        .map(|arg| systemd_quote(arg))
        .collect::<Vec<_>>()
        .join(" ");
    let restart = if d.restart.keep_alive { "on-failure" } else { "no" };
    let user = d
        .user
        .as_deref()
        .map(|u| format!("User={u}\n"))
        .unwrap_or_default();
    let install = if d.restart.run_at_load {
        "\n[Install]\nWantedBy=default.target\n"
    } else {
        ""
    };

    format!(
        "[Unit]\n\
         Description=Bridge agent ({name})\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={exec_start}\n\
         WorkingDirectory={working_dir}\n\
         Restart={restart}\n\
         RestartSec={throttle}\n\
         StandardOutput=append:{stdout}\n\
         StandardError=append:{stderr}\n\
         {user}{install}",
        name = d.name,
        exec_start = exec_start,
        working_dir = systemd_quote(&d.working_dir.display().to_string()),
        restart = restart,
        throttle = d.restart.throttle_interval_secs,
        stdout = d.stdout_path.display(),
        stderr = d.stderr_path.display(),
        user = user,
        install = install,
    )
}

fn resolve(path: &Path, what: &str) -> Result<PathBuf, ServiceError> {
    if !path.is_absolute() {
        return Err(ServiceError::InvalidDescriptor(format!(
            "{what} path must be absolute: {}",
            path.display()
        )));
    }
    match fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        // Not yet deployed; keep the absolute path as given.
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(path.to_path_buf()),
        Err(e) => Err(io_err(path, e)),
    }
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn systemd_quote(raw: &str) -> String {
    let escaped = raw.replace('%', "%%").replace('$', "$$");
    if escaped.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
        format!("\"{}\"", escaped.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        escaped
    }
}
