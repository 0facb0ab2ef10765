use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{info, warn};

use super::cancel::{CancelToken, Teardown};
use super::negotiate::PortNegotiator;
use super::platform::Platform;
use super::runner::{CommandRunner, ContainerProcess, LocalRunner};
use crate::config::Config;
use crate::error::{Error, Result};

/// One managed run of an index image.
///
/// The image is pulled and served lazily by [`start`](Self::start). The
/// container is torn down by [`close`](Self::close), when the manager is
/// dropped, or from another thread through an attached [`CancelToken`], so an
/// early return, a panic or an interrupt never leaks it.
pub struct ContainerManager<R: CommandRunner = LocalRunner> {
    image: String,
    session: Arc<Session<R>>,
    cancel: CancelToken,
}

/// Lifecycle state shared with the cancellation path.
struct Session<R> {
    runner: R,
    config: Config,
    state: Mutex<State>,
}

struct State {
    platform: Option<Platform>,
    port: u16,
    process: Option<Box<dyn ContainerProcess>>,
    pulled: bool,
    /// A launch owns its attempt containers until it returns.
    launching: bool,
}

impl<R: CommandRunner> Session<R> {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Kill the container process, then stop and remove the container.
    fn release(&self) {
        let mut state = self.state();
        let name = self.config.container_name_at(state.port);

        if let Some(mut process) = state.process.take() {
            if let Err(err) = process.kill() {
                warn!(error = %err, "failed to kill container process");
            }
            if let Some(platform) = state.platform {
                self.cleanup(&platform.stop_command(&name));
            }
        }

        if state.pulled && !state.launching {
            if let Some(platform) = state.platform {
                self.cleanup(&platform.remove_command(&name));
            }
            state.pulled = false;
        }
    }

    fn cleanup(&self, command: &str) {
        if let Err(err) = self.runner.run_tolerant(command) {
            warn!(command, error = %err, "cleanup command failed");
        }
    }
}

impl<R: CommandRunner + Send + Sync> Teardown for Session<R> {
    fn teardown(&self) {
        self.release();
    }
}

impl ContainerManager<LocalRunner> {
    pub fn new(image: impl Into<String>) -> Self {
        Self::with_runner(image, Config::default(), LocalRunner)
    }
}

impl<R: CommandRunner> ContainerManager<R> {
    pub fn with_runner(image: impl Into<String>, config: Config, runner: R) -> Self {
        let state = State {
            platform: None,
            port: config.base_port,
            process: None,
            pulled: false,
            launching: false,
        };
        Self {
            image: image.into(),
            session: Arc::new(Session {
                runner,
                config,
                state: Mutex::new(state),
            }),
            cancel: CancelToken::new(),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn platform(&self) -> Option<Platform> {
        self.session.state().platform
    }

    pub fn port(&self) -> u16 {
        self.session.state().port
    }

    pub fn runner(&self) -> &R {
        &self.session.runner
    }

    pub fn is_pulled(&self) -> bool {
        self.session.state().pulled
    }

    pub fn is_running(&self) -> bool {
        self.session.state().process.is_some()
    }

    /// Serve the image at the first free port. No-op when already running.
    pub fn start(&mut self) -> Result<()> {
        let session = &self.session;
        let (platform, pulled) = {
            let state = session.state();
            if state.process.is_some() {
                return Ok(());
            }
            (state.platform, state.pulled)
        };
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let platform = match platform {
            Some(platform) => platform,
            None => {
                let platform = Platform::resolve(&session.runner)?;
                session.state().platform = Some(platform);
                platform
            }
        };
        if !pulled {
            info!(image = %self.image, %platform, "pulling image");
            session.runner.run(&platform.pull_command(&self.image))?;
            session.state().pulled = true;
        }

        session.state().launching = true;
        let negotiated = PortNegotiator::new(&session.runner, &session.config, &self.cancel)
            .negotiate(&self.image, platform);
        session.state().launching = false;
        let (port, process) = match negotiated {
            Ok(found) => found,
            Err(Error::Cancelled) => {
                // The launcher already removed its in-flight container.
                session.state().pulled = false;
                return Err(Error::Cancelled);
            }
            Err(err) => return Err(err),
        };
        {
            let mut state = session.state();
            state.port = port;
            state.process = Some(process);
        }

        // A cancel landing before the store above had nothing to release.
        if self.cancel.is_cancelled() {
            session.release();
            return Err(Error::Cancelled);
        }
        info!(image = %self.image, port, "index image is being served");
        Ok(())
    }

    /// `localhost:<port>` of the running registry.
    pub fn local_address(&self) -> Result<String> {
        let state = self.session.state();
        if state.process.is_none() {
            return Err(Error::NotRunning);
        }
        Ok(format!("localhost:{}", state.port))
    }

    /// Kill the container process, then stop and remove the container.
    ///
    /// Teardown failures are logged and swallowed; the session always ends up
    /// neither running nor pulled.
    pub fn close(&mut self) {
        self.session.release();
    }
}

impl<R: CommandRunner + Send + Sync + 'static> ContainerManager<R> {
    /// Tear this session down whenever `token` is cancelled.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        let session: Weak<Session<R>> = Arc::downgrade(&self.session);
        let session: Weak<dyn Teardown> = session;
        token.attach(session);
        self.cancel = token;
        self
    }
}

impl<R: CommandRunner> Drop for ContainerManager<R> {
    fn drop(&mut self) {
        self.close();
    }
}
