// Container lifecycle: platform detection, pull, port negotiation, readiness, teardown.

mod cancel;
#[cfg(test)]
pub(crate) mod fake;
mod launch;
mod manager;
mod negotiate;
mod platform;
mod runner;

pub use cancel::CancelToken;
pub use launch::{Launcher, classify_failure};
pub use manager::ContainerManager;
pub use negotiate::PortNegotiator;
pub use platform::Platform;
pub use runner::{CommandRunner, ContainerProcess, LocalRunner};
