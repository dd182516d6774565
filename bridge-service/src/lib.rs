//! Installed lifecycle of the bridge under the platform service supervisor:
//! descriptor generation, supervisor gateways, and the lifecycle controller.

pub mod controller;
pub mod descriptor;
mod error;
pub mod launchd;
pub mod paths;
pub mod supervisor;
pub mod systemd;

pub use controller::{LifecycleController, ServiceReport, Transition};
pub use descriptor::{DescriptorFormat, DescriptorRequest};
pub use error::ServiceError;
pub use supervisor::{platform_gateway, Liveness, SupervisorGateway};
