//! Scripted engine used by the lifecycle tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::cancel::CancelToken;
use super::runner::{CommandRunner, ContainerProcess};
use crate::error::{Error, Result};

pub const READY: &str = "api.Registry.GetBundle\napi.Registry.ListBundles\napi.Registry.ListPackages\n";

/// How a spawned fake process behaves.
#[derive(Debug, Clone)]
pub enum Exit {
    /// Keeps running until killed.
    Never,
    /// Reports termination on the given poll with `stderr` as its output.
    OnPoll(u32, String),
    /// Polling the process fails.
    Unobservable,
}

impl Exit {
    pub fn immediately(stderr: &str) -> Self {
        Exit::OnPoll(1, stderr.to_string())
    }
}

#[derive(Default)]
struct State {
    podman: bool,
    docker: bool,
    pull_fails: bool,
    teardown_fails: bool,
    readiness_replies: VecDeque<Option<String>>,
    readiness_default: String,
    query_reply: String,
    cancel_on_readiness_check: bool,
    cancel_on_query: bool,
    exits: VecDeque<Exit>,
    commands: Vec<String>,
    spawned: Vec<Vec<String>>,
    kills: Vec<usize>,
    polls: usize,
}

#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Arc<Mutex<State>>,
    token: CancelToken,
}

impl FakeRunner {
    /// Podman installed, every readiness check answers "not ready", processes never exit.
    pub fn new() -> Self {
        let runner = Self::default();
        runner.lock().podman = true;
        runner
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_platforms(self, podman: bool, docker: bool) -> Self {
        {
            let mut state = self.lock();
            state.podman = podman;
            state.docker = docker;
        }
        self
    }

    pub fn ready(self) -> Self {
        self.lock().readiness_default = READY.to_string();
        self
    }

    /// Scripted readiness answers; `None` makes the check fail.
    pub fn readiness_replies(self, replies: impl IntoIterator<Item = Option<&'static str>>) -> Self {
        self.lock()
            .readiness_replies
            .extend(replies.into_iter().map(|r| r.map(str::to_string)));
        self
    }

    pub fn exits(self, exits: impl IntoIterator<Item = Exit>) -> Self {
        self.lock().exits.extend(exits);
        self
    }

    pub fn failing_pull(self) -> Self {
        self.lock().pull_fails = true;
        self
    }

    pub fn failing_teardown(self) -> Self {
        self.lock().teardown_fails = true;
        self
    }

    pub fn query_reply(self, reply: &str) -> Self {
        self.lock().query_reply = reply.to_string();
        self
    }

    /// Fire `token()` when the first readiness check is answered.
    pub fn cancel_on_readiness_check(self) -> Self {
        self.lock().cancel_on_readiness_check = true;
        self
    }

    /// Fire `token()` while a registry query is in flight.
    pub fn cancel_on_query(self) -> Self {
        self.lock().cancel_on_query = true;
        self
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.lock()
            .commands
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }

    pub fn spawned(&self) -> Vec<Vec<String>> {
        self.lock().spawned.clone()
    }

    /// Indexes (into `spawned`) of killed processes, one entry per kill.
    pub fn kills(&self) -> Vec<usize> {
        self.lock().kills.clone()
    }

    pub fn polls(&self) -> usize {
        self.lock().polls
    }

    fn answer(&self, command: &str) -> Result<String> {
        let (reply, cancel) = self.reply(command);
        // Cancelling tears sessions down through this runner, so the state
        // lock must be released first.
        if cancel {
            self.token.cancel();
        }
        reply
    }

    fn reply(&self, command: &str) -> (Result<String>, bool) {
        let mut state = self.lock();
        state.commands.push(command.to_string());

        let failed = || Error::Command {
            command: command.to_string(),
            code: Some(1),
            stderr: "scripted failure".into(),
        };

        if let Some(binary) = command.strip_prefix("command -v ") {
            let present = match binary {
                "podman" => state.podman,
                "docker" => state.docker,
                _ => false,
            };
            let found = if present {
                format!("/usr/bin/{binary}\n")
            } else {
                String::new()
            };
            return (Ok(found), false);
        }
        if command.contains(" pull ") {
            let reply = if state.pull_fails { Err(failed()) } else { Ok(String::new()) };
            return (reply, false);
        }
        if command.contains(" stop ") || command.contains(" rm ") {
            let reply = if state.teardown_fails { Err(failed()) } else { Ok(String::new()) };
            return (reply, false);
        }
        if command.contains(" list ") {
            let reply = match state.readiness_replies.pop_front() {
                Some(Some(reply)) => Ok(reply),
                Some(None) => Err(failed()),
                None => Ok(state.readiness_default.clone()),
            };
            return (reply, std::mem::take(&mut state.cancel_on_readiness_check));
        }
        let cancel = std::mem::take(&mut state.cancel_on_query);
        (Ok(state.query_reply.clone()), cancel)
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &str) -> Result<String> {
        self.answer(command)
    }

    fn run_tolerant(&self, command: &str) -> Result<String> {
        self.answer(command)
    }

    fn spawn(&self, argv: &[String]) -> Result<Box<dyn ContainerProcess>> {
        let mut state = self.lock();
        state.spawned.push(argv.to_vec());
        let exit = state.exits.pop_front().unwrap_or(Exit::Never);
        Ok(Box::new(FakeProcess {
            id: state.spawned.len() - 1,
            state: Arc::clone(&self.state),
            exit,
            polls: 0,
            killed: false,
        }))
    }
}

struct FakeProcess {
    id: usize,
    state: Arc<Mutex<State>>,
    exit: Exit,
    polls: u32,
    killed: bool,
}

impl ContainerProcess for FakeProcess {
    fn has_exited(&mut self) -> Result<bool> {
        self.state.lock().unwrap().polls += 1;
        self.polls += 1;
        if matches!(self.exit, Exit::Unobservable) && !self.killed {
            return Err(std::io::Error::other("wait failed").into());
        }
        Ok(self.killed || matches!(self.exit, Exit::OnPoll(n, _) if self.polls >= n))
    }

    fn read_stderr(&mut self) -> String {
        match &self.exit {
            Exit::OnPoll(_, stderr) => stderr.clone(),
            Exit::Never | Exit::Unobservable => String::new(),
        }
    }

    fn kill(&mut self) -> Result<()> {
        self.state.lock().unwrap().kills.push(self.id);
        self.killed = true;
        Ok(())
    }
}
