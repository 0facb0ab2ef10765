use tracing::info;

use super::cancel::CancelToken;
use super::launch::Launcher;
use super::platform::Platform;
use super::runner::{CommandRunner, ContainerProcess};
use crate::config::Config;
use crate::error::{Error, Result};

/// Searches `[base_port, base_port + max_port_tries)` for a port the
/// registry container can bind.
pub struct PortNegotiator<'a, R: ?Sized> {
    launcher: Launcher<'a, R>,
    base_port: u16,
    max_port_tries: u16,
}

impl<'a, R: CommandRunner + ?Sized> PortNegotiator<'a, R> {
    pub fn new(runner: &'a R, config: &'a Config, cancel: &'a CancelToken) -> Self {
        Self {
            launcher: Launcher::new(runner, config, cancel),
            base_port: config.base_port,
            max_port_tries: config.max_port_tries,
        }
    }

    fn candidate_ports(&self) -> impl Iterator<Item = u16> {
        (self.base_port..=u16::MAX).take(usize::from(self.max_port_tries))
    }

    /// Start the container at the first free port.
    ///
    /// Only conflicts advance the search. Any other launch failure has
    /// already used up its retries and is returned as is.
    pub fn negotiate(
        &self,
        image: &str,
        platform: Platform,
    ) -> Result<(u16, Box<dyn ContainerProcess>)> {
        let mut attempts = 0;
        for port in self.candidate_ports() {
            attempts += 1;
            match self.launcher.launch(platform, image, port) {
                Ok(process) => return Ok((port, process)),
                Err(err) if err.is_conflict() => {
                    info!(port, error = %err, "port is in use, trying another");
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::NoFreePortFound { attempts })
    }
}
