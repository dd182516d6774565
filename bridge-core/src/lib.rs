//! Bridge core library: domain types, configuration, and the polling and
//! external-tool plumbing shared by the lifecycle controller and the trust
//! pipeline.
//!
//! - [`types`]: service identity, descriptor, state, timings
//! - [`config`]: `~/.bridge/config.yaml` load / save
//! - [`poll`]: timeout-bounded, cancellable polling
//! - [`tool`]: external command runner
//! - [`error`]: [`ConfigError`], [`ToolError`]

pub mod config;
pub mod error;
pub mod poll;
pub mod tool;
pub mod types;

pub use config::BridgeConfig;
pub use error::{ConfigError, ToolError};
pub use poll::{poll_until, CancelToken, PollOutcome, PollSchedule};
pub use tool::{run_tool, ToolOutput};
pub use types::{
    LifecycleTimings, NotarizationTimings, RestartPolicy, ServiceDescriptor, ServiceName,
    ServiceState,
};
