use std::thread;

use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::platform::Platform;
use super::runner::{CommandRunner, ContainerProcess};
use crate::config::Config;
use crate::error::{Conflict, Error, Result};

/// Starts the registry container at a single port and waits for it to serve.
pub struct Launcher<'a, R: ?Sized> {
    runner: &'a R,
    config: &'a Config,
    cancel: &'a CancelToken,
}

impl<'a, R: CommandRunner + ?Sized> Launcher<'a, R> {
    pub fn new(runner: &'a R, config: &'a Config, cancel: &'a CancelToken) -> Self {
        Self {
            runner,
            config,
            cancel,
        }
    }

    /// Launch at `port`, retrying engine failures up to `launch_tries` times.
    ///
    /// Conflicts are returned on the first occurrence so the caller can move
    /// on to another port.
    pub fn launch(
        &self,
        platform: Platform,
        image: &str,
        port: u16,
    ) -> Result<Box<dyn ContainerProcess>> {
        let mut attempt = 1;
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match self.launch_once(platform, image, port) {
                Err(err) if err.is_retryable() && attempt < self.config.launch_tries => {
                    warn!(port, attempt, error = %err, "launch failed, retrying");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    fn launch_once(
        &self,
        platform: Platform,
        image: &str,
        port: u16,
    ) -> Result<Box<dyn ContainerProcess>> {
        let name = self.config.container_name_at(port);
        let argv = platform.run_args(&name, port, image);
        let mut process = self.runner.spawn(&argv)?;

        for _ in 0..self.config.readiness_ticks() {
            thread::sleep(self.config.poll_interval());

            if self.cancel.is_cancelled() {
                self.kill(process.as_mut(), port);
                for command in [platform.stop_command(&name), platform.remove_command(&name)] {
                    if let Err(err) = self.runner.run_tolerant(&command) {
                        warn!(%command, error = %err, "cleanup command failed");
                    }
                }
                return Err(Error::Cancelled);
            }

            let exited = match process.has_exited() {
                Ok(exited) => exited,
                Err(err) => {
                    self.kill(process.as_mut(), port);
                    return Err(err);
                }
            };
            if exited {
                let stderr = process.read_stderr();
                return Err(classify_failure(&stderr, port, &name, &argv));
            }

            if self.is_ready(port) {
                debug!(command = %shell_words::join(&argv), "started");
                info!(port, "index registry service has been initialized");
                return Ok(process);
            }
        }

        self.kill(process.as_mut(), port);
        Err(Error::Launch("index registry has not been initialized".into()))
    }

    fn kill(&self, process: &mut dyn ContainerProcess, port: u16) {
        if let Err(err) = process.kill() {
            warn!(port, error = %err, "failed to kill container process");
        }
    }

    /// A failing check only means the service is not up yet.
    fn is_ready(&self, port: u16) -> bool {
        let check = format!(
            "{} -plaintext localhost:{port} list {}",
            self.config.grpc_client, self.config.service
        );
        match self.runner.run(&check) {
            Ok(listing) => self
                .config
                .ready_methods
                .iter()
                .any(|method| listing.contains(method.as_str())),
            Err(err) => {
                debug!(port, error = %err, "registry not answering yet");
                false
            }
        }
    }
}

/// Map the stderr of an engine process that exited early to an error.
///
/// This relies on podman/docker wording; keep every pattern here.
pub fn classify_failure(stderr: &str, port: u16, name: &str, argv: &[String]) -> Error {
    if stderr.contains("address already in use") {
        Error::AddressAlreadyInUse {
            port,
            conflict: Conflict::Port,
        }
    } else if stderr.contains("the container name") && stderr.contains("is already in use by") {
        Error::AddressAlreadyInUse {
            port,
            conflict: Conflict::Name(name.to_string()),
        }
    } else {
        Error::Launch(format!(
            "command {} has failed with error {}",
            shell_words::join(argv),
            stderr.trim()
        ))
    }
}
