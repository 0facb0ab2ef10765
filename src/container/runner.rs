use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::thread::JoinHandle;

use tracing::debug;

use crate::error::{Error, Result};

/// Executes engine and grpcurl commands on behalf of a session.
pub trait CommandRunner {
    /// Run a shell command and return its stdout. A non-zero exit is an error.
    fn run(&self, command: &str) -> Result<String>;

    /// Run a shell command and return its stdout whatever the exit status.
    fn run_tolerant(&self, command: &str) -> Result<String>;

    /// Start a long-running process without waiting for it.
    fn spawn(&self, argv: &[String]) -> Result<Box<dyn ContainerProcess>>;
}

/// A spawned engine process owned by exactly one session.
pub trait ContainerProcess: Send {
    fn has_exited(&mut self) -> Result<bool>;

    /// Everything the process wrote to stderr. Only complete once it has exited.
    fn read_stderr(&mut self) -> String;

    /// Kill and reap the process.
    fn kill(&mut self) -> Result<()>;
}

/// Runs commands on the local host through `sh` and `std::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

impl LocalRunner {
    fn output(&self, command: &str) -> Result<Output> {
        debug!(command, "running");
        Command::new("sh")
            .args(["-c", command])
            .stdin(Stdio::null())
            .output()
            .map_err(|source| Error::Spawn {
                command: command.to_string(),
                source,
            })
    }
}

impl CommandRunner for LocalRunner {
    fn run(&self, command: &str) -> Result<String> {
        let output = self.output(command)?;
        if !output.status.success() {
            return Err(Error::Command {
                command: command.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_tolerant(&self, command: &str) -> Result<String> {
        let output = self.output(command)?;
        if !output.status.success() {
            debug!(command, status = %output.status, "tolerated failure");
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn(&self, argv: &[String]) -> Result<Box<dyn ContainerProcess>> {
        let command = shell_words::join(argv);
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::Launch("cannot spawn an empty command".into()));
        };
        debug!(%command, "spawning");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn { command, source })?;

        // Drain stderr continuously so a chatty server never blocks on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        Ok(Box::new(LocalProcess { child, stderr }))
    }
}

struct LocalProcess {
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

impl ContainerProcess for LocalProcess {
    fn has_exited(&mut self) -> Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    fn read_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }

    fn kill(&mut self) -> Result<()> {
        // InvalidInput means the process already exited; reaping still applies.
        if let Err(err) = self.child.kill()
            && err.kind() != std::io::ErrorKind::InvalidInput
        {
            return Err(err.into());
        }
        self.child.wait()?;
        Ok(())
    }
}
