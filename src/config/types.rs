use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Lifecycle and readiness settings for a container session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_port: u16,
    pub max_port_tries: u16,
    /// Seconds to wait for the registry to answer the readiness check.
    pub readiness_timeout: u64,
    pub poll_interval_ms: u64,
    /// Launch attempts at a single port before an engine failure is fatal.
    pub launch_tries: u32,
    pub container_name: String,
    pub grpc_client: String,
    pub service: String,
    pub ready_methods: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_port: 50051,
            max_port_tries: 100,
            readiness_timeout: 3,
            poll_interval_ms: 1000,
            launch_tries: 2,
            container_name: "OIIInspector_running_container".to_string(),
            grpc_client: "grpcurl".to_string(),
            service: "api.Registry".to_string(),
            ready_methods: vec![
                "api.Registry.ListBundles".to_string(),
                "api.Registry.ListPackages".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Number of poll ticks that fit into the readiness timeout.
    pub fn readiness_ticks(&self) -> u64 {
        if self.poll_interval_ms == 0 {
            return self.readiness_timeout;
        }
        self.readiness_timeout
            .saturating_mul(1000)
            .div_ceil(self.poll_interval_ms)
    }

    pub fn container_name_at(&self, port: u16) -> String {
        format!("{}_{port}", self.container_name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_port_tries == 0 {
            bail!("max_port_tries must be a positive integer");
        }
        if self.launch_tries == 0 {
            bail!("launch_tries must be a positive integer");
        }
        if self.readiness_timeout == 0 {
            bail!("readiness_timeout must be a positive integer");
        }
        let last = u32::from(self.base_port) + u32::from(self.max_port_tries) - 1;
        if last > u32::from(u16::MAX) {
            bail!(
                "port range {}..={last} exceeds {}",
                self.base_port,
                u16::MAX
            );
        }
        if self.container_name.trim().is_empty() {
            bail!("container_name cannot be blank");
        }
        Ok(())
    }
}
