//! Daemon lifecycle controller.
//!
//! State machine over the installed service:
//!
//! ```text
//!   NotInstalled --install--> InstalledStopped --start--> Running
//!        ^                        |    ^                    |
//!        +-------uninstall--------+    +-------stop---------+
//! ```
//!
//! The supervisor is the only source of truth. Start and stop are confirmed
//! by polling [`SupervisorGateway::query`], never by the command's exit
//! status. Callers must not run overlapping operations on the same service.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use bridge_core::{
    poll_until, CancelToken, LifecycleTimings, PollOutcome, ServiceName, ServiceState,
};

use crate::descriptor::{self, DescriptorRequest};
use crate::error::{io_err, ServiceError};
use crate::supervisor::{Liveness, SupervisorGateway};

/// Successful outcome of a state-changing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// The operation changed the service state.
    Completed,
    /// Nothing to do; the service was already where the caller wanted it.
    AlreadyInDesiredState,
}

/// Point-in-time view of the service for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub name: String,
    pub state: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub descriptor: PathBuf,
    pub descriptor_present: bool,
}

pub struct LifecycleController<G> {
    gateway: G,
    name: ServiceName,
    timings: LifecycleTimings,
    cancel: CancelToken,
}

impl<G: SupervisorGateway> LifecycleController<G> {
    pub fn new(gateway: G, name: ServiceName) -> Self {
        Self {
            gateway,
            name,
            timings: LifecycleTimings::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_timings(mut self, timings: LifecycleTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.gateway.descriptor_path(&self.name)
    }

    /// Render the descriptor `install` would write, without writing it.
    pub fn preview(&self, request: &DescriptorRequest) -> Result<String, ServiceError> {
        self.check_request(request)?;
        let descriptor = descriptor::build(request)?;
        Ok(descriptor::render(&descriptor, self.gateway.format()))
    }

    /// Write the descriptor and register it with the supervisor.
    ///
    /// An existing descriptor is left untouched and reported as
    /// [`ServiceError::AlreadyInstalled`]. If registration fails the freshly
    /// written descriptor is removed again.
    pub fn install(&self, request: &DescriptorRequest) -> Result<PathBuf, ServiceError> {
        self.check_request(request)?;

        let path = self.descriptor_path();
        if path.exists() {
            return Err(ServiceError::AlreadyInstalled {
                service: self.name.to_string(),
                path,
            });
        }

        let descriptor = descriptor::build(request)?;
        let text = descriptor::render(&descriptor, self.gateway.format());
        descriptor::write_atomic(&path, &text)?;
        info!("wrote descriptor {}", path.display());

        if let Err(source) = self.gateway.register(&self.name, &path) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("rollback of {} failed: {e}", path.display());
            }
            return Err(self.supervisor_err("register", source));
        }

        info!("registered service '{}'", self.name);
        Ok(path)
    }

    /// Stop (best effort), deregister (best effort) and delete the descriptor.
    pub fn uninstall(&self) -> Result<Transition, ServiceError> {
        let path = self.descriptor_path();
        let state = self.status();
        if state == ServiceState::NotInstalled && !path.exists() {
            return Ok(Transition::AlreadyInDesiredState);
        }

        if state == ServiceState::Running {
            if let Err(e) = self.stop() {
                warn!("stop before uninstall of '{}' failed: {e}", self.name);
            }
        }

        match self.gateway.deregister(&self.name) {
            Ok(true) => info!("deregistered service '{}'", self.name),
            Ok(false) => debug!("service '{}' was not loaded", self.name),
            Err(e) => warn!("deregister of '{}' failed: {e}", self.name),
        }

        match fs::remove_file(&path) {
            Ok(()) => info!("removed descriptor {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&path, e)),
        }

        Ok(Transition::Completed)
    }

    /// Request a start and wait until the supervisor lists a live process.
    pub fn start(&self) -> Result<Transition, ServiceError> {
        self.check_cancel("start")?;

        let path = self.descriptor_path();
        if !path.exists() {
            return Err(ServiceError::NotInstalled {
                service: self.name.to_string(),
                path,
            });
        }

        match self.gateway.query(&self.name) {
            Ok(Liveness::Running { pid }) => {
                info!("service '{}' already running (pid {pid})", self.name);
                return Ok(Transition::AlreadyInDesiredState);
            }
            Ok(Liveness::NotLoaded) => {
                debug!("service '{}' not loaded; registering", self.name);
                self.gateway
                    .register(&self.name, &path)
                    .map_err(|e| self.supervisor_err("register", e))?;
            }
            Ok(Liveness::Loaded) => {}
            Err(e) => debug!("pre-start query for '{}' failed: {e}", self.name),
        }

        self.gateway
            .start(&self.name)
            .map_err(|e| self.supervisor_err("start", e))?;

        let schedule = self.timings.start_schedule();
        let outcome = poll_until(schedule, &self.cancel, |attempt| {
            match self.gateway.query(&self.name) {
                Ok(Liveness::Running { pid }) => return Ok(Some(pid)),
                Ok(other) => debug!("start poll {attempt}: {other:?}"),
                Err(e) => debug!("start poll {attempt}: query failed: {e}"),
            }
            Ok::<_, ServiceError>(None)
        })?;

        match outcome {
            PollOutcome::Ready(pid) => {
                info!("service '{}' running (pid {pid})", self.name);
                Ok(Transition::Completed)
            }
            PollOutcome::TimedOut { .. } => Err(ServiceError::StartTimeout {
                service: self.name.to_string(),
                waited: schedule.timeout,
            }),
            PollOutcome::Cancelled { .. } => Err(self.cancelled("start")),
        }
    }

    /// Request a stop and wait until no live process is listed.
    pub fn stop(&self) -> Result<Transition, ServiceError> {
        self.check_cancel("stop")?;

        match self.gateway.query(&self.name) {
            Ok(liveness) if !liveness.is_running() => {
                return Ok(Transition::AlreadyInDesiredState);
            }
            Ok(_) => {}
            Err(e) => return Err(self.supervisor_err("query", e)),
        }

        self.gateway
            .stop(&self.name)
            .map_err(|e| self.supervisor_err("stop", e))?;

        let schedule = self.timings.stop_schedule();
        let outcome = poll_until(schedule, &self.cancel, |attempt| {
            match self.gateway.query(&self.name) {
                Ok(liveness) if !liveness.is_running() => return Ok(Some(())),
                Ok(liveness) => debug!("stop poll {attempt}: {liveness:?}"),
                Err(e) => debug!("stop poll {attempt}: query failed: {e}"),
            }
            Ok::<_, ServiceError>(None)
        })?;

        match outcome {
            PollOutcome::Ready(()) => {
                info!("service '{}' stopped", self.name);
                Ok(Transition::Completed)
            }
            PollOutcome::TimedOut { .. } => Err(ServiceError::StopTimeout {
                service: self.name.to_string(),
                waited: schedule.timeout,
            }),
            PollOutcome::Cancelled { .. } => Err(self.cancelled("stop")),
        }
    }

    /// Stop, settle, start. The first failing half aborts the sequence.
    pub fn restart(&self) -> Result<(), ServiceError> {
        self.stop()?;
        if !self.cancel.sleep(self.timings.restart_settle) {
            return Err(self.cancelled("restart"));
        }
        self.start()?;
        Ok(())
    }

    /// Classify the service from one supervisor query.
    ///
    /// A failed query means no supervisor knows the service, which is the
    /// common case on a clean machine, so it reads as `NotInstalled`.
    pub fn status(&self) -> ServiceState {
        self.report().state
    }

    pub fn report(&self) -> ServiceReport {
        let descriptor = self.descriptor_path();
        let descriptor_present = descriptor.exists();

        let (state, pid) = match self.gateway.query(&self.name) {
            Ok(Liveness::Running { pid }) => (ServiceState::Running, Some(pid)),
            Ok(Liveness::Loaded) => (ServiceState::InstalledStopped, None),
            Ok(Liveness::NotLoaded) if descriptor_present => (ServiceState::InstalledStopped, None),
            Ok(Liveness::NotLoaded) => (ServiceState::NotInstalled, None),
            Err(e) => {
                debug!("status query for '{}' failed: {e}", self.name);
                (ServiceState::NotInstalled, None)
            }
        };

        ServiceReport {
            name: self.name.to_string(),
            state,
            pid,
            descriptor,
            descriptor_present,
        }
    }

    fn check_request(&self, request: &DescriptorRequest) -> Result<(), ServiceError> {
        if request.name != self.name {
            return Err(ServiceError::InvalidDescriptor(format!(
                "descriptor names '{}' but controller manages '{}'",
                request.name, self.name
            )));
        }
        Ok(())
    }

    fn check_cancel(&self, operation: &'static str) -> Result<(), ServiceError> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled(operation));
        }
        Ok(())
    }

    fn cancelled(&self, operation: &'static str) -> ServiceError {
        ServiceError::Cancelled {
            operation,
            service: self.name.to_string(),
        }
    }

    fn supervisor_err(&self, operation: &'static str, source: bridge_core::ToolError) -> ServiceError {
        ServiceError::Supervisor {
            operation,
            service: self.name.to_string(),
            source,
        }
    }
}
