//! `bridgectl service`: install and drive the bridge under the platform
//! service supervisor.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use bridge_core::{BridgeConfig, CancelToken, ServiceName, ServiceState};
use bridge_service::paths::{logs_dir, stderr_log_path, stdout_log_path};
use bridge_service::{
    platform_gateway, DescriptorRequest, LifecycleController, ServiceReport, SupervisorGateway,
    Transition,
};

use super::load_config;

type Controller = LifecycleController<Box<dyn SupervisorGateway>>;

#[derive(Subcommand, Debug)]
pub enum ServiceCommand {
    /// Write the service descriptor and register it with the supervisor.
    Install(DescriptorArgs),
    /// Stop, deregister and delete the service descriptor.
    Uninstall(NameArgs),
    /// Start the service and wait until it is running.
    Start(NameArgs),
    /// Stop the service and wait until it has exited.
    Stop(NameArgs),
    /// Stop, pause briefly, then start.
    Restart(NameArgs),
    /// Show the current service state.
    Status(StatusArgs),
    /// Print the descriptor `install` would write.
    Descriptor(DescriptorArgs),
    /// Print recent bridge log lines.
    Logs(LogsArgs),
}

#[derive(Args, Debug)]
pub struct NameArgs {
    /// Service name (defaults to the configured name).
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct DescriptorArgs {
    /// Service name (defaults to the configured name).
    #[arg(long)]
    pub name: Option<String>,

    /// Absolute path of the bridge executable.
    #[arg(long)]
    pub executable: Option<PathBuf>,

    /// Config file passed to the bridge as `--config`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for the bridge's stdout/stderr logs.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Service name (defaults to the configured name).
    #[arg(long)]
    pub name: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the stderr log file.
    #[arg(long)]
    pub stderr_only: bool,
}

pub fn run(command: ServiceCommand, cancel: CancelToken) -> Result<()> {
    let (home, config) = load_config()?;

    match command {
        ServiceCommand::Install(args) => {
            let controller = controller(&home, &config, args.name.as_deref(), cancel)?;
            let request = descriptor_request(&home, &config, controller.name(), &args);
            match controller.install(&request) {
                Ok(path) => println!(
                    "installed service '{}': {}",
                    controller.name(),
                    path.display()
                ),
                Err(err) if err.is_noop() => println!("{err}"),
                Err(err) => return Err(err).context("failed to install service"),
            }
        }
        ServiceCommand::Uninstall(args) => {
            let controller = controller(&home, &config, args.name.as_deref(), cancel)?;
            let outcome = controller
                .uninstall()
                .context("failed to uninstall service")?;
            report_transition(&controller, outcome, "uninstalled", "not installed");
        }
        ServiceCommand::Start(args) => {
            let controller = controller(&home, &config, args.name.as_deref(), cancel)?;
            let outcome = controller.start().context("failed to start service")?;
            report_transition(&controller, outcome, "started", "already running");
        }
        ServiceCommand::Stop(args) => {
            let controller = controller(&home, &config, args.name.as_deref(), cancel)?;
            let outcome = controller.stop().context("failed to stop service")?;
            report_transition(&controller, outcome, "stopped", "not running");
        }
        ServiceCommand::Restart(args) => {
            let controller = controller(&home, &config, args.name.as_deref(), cancel)?;
            controller.restart().context("failed to restart service")?;
            println!("service '{}' restarted", controller.name());
        }
        ServiceCommand::Status(args) => {
            let controller = controller(&home, &config, args.name.as_deref(), cancel)?;
            let report = controller.report();
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report)
                        .context("failed to serialize status JSON")?
                );
            } else {
                print_report(report);
            }
        }
        ServiceCommand::Descriptor(args) => {
            let controller = controller(&home, &config, args.name.as_deref(), cancel)?;
            let request = descriptor_request(&home, &config, controller.name(), &args);
            let text = controller
                .preview(&request)
                .context("failed to render service descriptor")?;
            print!("{text}");
        }
        ServiceCommand::Logs(args) => {
            let dir = log_dir(&home, &config, None);
            if args.stderr_only {
                print_tail(&stderr_log_path(&dir), args.lines)
                    .context("failed to read bridge stderr log")?;
            } else {
                print_tail(&stdout_log_path(&dir), args.lines)
                    .context("failed to read bridge stdout log")?;
                print_tail(&stderr_log_path(&dir), args.lines)
                    .context("failed to read bridge stderr log")?;
            }
        }
    }

    Ok(())
}

fn controller(
    home: &Path,
    config: &BridgeConfig,
    name: Option<&str>,
    cancel: CancelToken,
) -> Result<Controller> {
    let name = name
        .map(ServiceName::from)
        .unwrap_or_else(|| config.service.name.clone());
    let gateway = platform_gateway(home).context("no service supervisor available")?;
    Ok(LifecycleController::new(gateway, name)
        .with_timings(config.lifecycle.timings())
        .with_cancel(cancel))
}

/// Config values overridden by any flags given on the command line.
fn descriptor_request(
    home: &Path,
    config: &BridgeConfig,
    name: &ServiceName,
    args: &DescriptorArgs,
) -> DescriptorRequest {
    let service = &config.service;
    let executable = args
        .executable
        .clone()
        .unwrap_or_else(|| service.executable.clone());

    let mut request = DescriptorRequest::new(
        name.clone(),
        executable,
        log_dir(home, config, args.log_dir.as_deref()),
    );
    request.config = args.config.clone().or_else(|| service.config.clone());
    request.working_dir = service.working_dir.clone();
    request.user = service.user.clone();
    request.restart = service.restart_policy();
    request
}

fn log_dir(home: &Path, config: &BridgeConfig, flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| config.service.log_dir.clone())
        .unwrap_or_else(|| logs_dir(home))
}

fn report_transition(
    controller: &Controller,
    outcome: Transition,
    done: &str,
    already: &str,
) {
    match outcome {
        Transition::Completed => println!("service '{}' {done}", controller.name()),
        Transition::AlreadyInDesiredState => {
            println!("service '{}' {already}; nothing to do", controller.name())
        }
    }
}

// ---------------------------------------------------------------------------
// Status table
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "service")]
    service: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "pid")]
    pid: String,
    #[tabled(rename = "descriptor")]
    descriptor: String,
}

fn print_report(report: ServiceReport) {
    println!("{} {}", state_indicator(report.state), report.state);

    let descriptor = if report.descriptor_present {
        report.descriptor.display().to_string()
    } else {
        format!("{} (absent)", report.descriptor.display())
    };
    let row = StatusTableRow {
        service: report.name,
        state: state_label(report.state).to_string(),
        pid: report
            .pid
            .map_or_else(|| "-".to_string(), |pid| pid.to_string()),
        descriptor,
    };
    let mut table = Table::new([row]);
    table.with(Style::rounded());
    println!("{table}");

    if report.state == ServiceState::NotInstalled {
        println!("Run 'bridgectl service install' to register the bridge.");
    }
}

fn state_label(state: ServiceState) -> &'static str {
    match state {
        ServiceState::NotInstalled => "NOT INSTALLED",
        ServiceState::InstalledStopped => "STOPPED",
        ServiceState::Running => "RUNNING",
    }
}

fn state_indicator(state: ServiceState) -> String {
    match state {
        ServiceState::NotInstalled => "■".bright_black().bold().to_string(),
        ServiceState::InstalledStopped => "■".yellow().bold().to_string(),
        ServiceState::Running => "■".green().bold().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut tail = VecDeque::<String>::with_capacity(lines);
    for line in reader.lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if lines == 0 {
            continue;
        }
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
