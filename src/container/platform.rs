use std::fmt;

use tracing::{debug, info};

use super::runner::CommandRunner;
use crate::error::{Error, Result};

/// Container engine available on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Podman,
    Docker,
}

impl Platform {
    /// Engines in order of preference.
    pub const CANDIDATES: [Platform; 2] = [Platform::Podman, Platform::Docker];

    pub fn binary(self) -> &'static str {
        match self {
            Platform::Podman => "podman",
            Platform::Docker => "docker",
        }
    }

    /// Search the host for an installed engine with `command -v`.
    pub fn resolve<R: CommandRunner + ?Sized>(runner: &R) -> Result<Self> {
        for candidate in Self::CANDIDATES {
            let found = runner.run_tolerant(&format!("command -v {}", candidate.binary()))?;
            if found.contains(&format!("/{}", candidate.binary())) {
                info!(platform = %candidate, path = found.trim(), "container platform found");
                return Ok(candidate);
            }
            debug!(platform = %candidate, "not installed");
        }
        Err(Error::MissingContainerPlatform)
    }

    /// Arguments for serving `image` as the container `name` on `port`.
    pub fn run_args(self, name: &str, port: u16, image: &str) -> Vec<String> {
        vec![
            self.binary().to_string(),
            "run".into(),
            format!("--name={name}"),
            format!("-p={port}:{port}"),
            image.to_string(),
        ]
    }

    pub fn pull_command(self, image: &str) -> String {
        format!("{} pull {}", self.binary(), shell_words::quote(image))
    }

    pub fn stop_command(self, name: &str) -> String {
        format!("{} stop {}", self.binary(), shell_words::quote(name))
    }

    pub fn remove_command(self, name: &str) -> String {
        format!("{} rm {}", self.binary(), shell_words::quote(name))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}
