// src/exec/backend.rs

//! Pluggable command executor abstraction.
//!
//! Workspaces talk to a `CommandExecutor` instead of spawning processes
//! directly. Production code uses [`RealCommandExecutor`]; tests provide an
//! executor that records invocations and returns scripted output.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::Result;
use crate::types::Context;

use super::process::run_command;

/// A single command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory.
    pub dir: PathBuf,
    /// Extra environment in `KEY=VALUE` form, added on top of the inherited
    /// process environment.
    pub env: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: dir.into(),
            env: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// `KEY=VALUE` pairs split for `Command::envs`. Malformed entries are
    /// skipped.
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().filter_map(|kv| kv.split_once('='))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status and combined stdout/stderr of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Trait abstracting how terraform commands are executed.
pub trait CommandExecutor: Send + Sync {
    /// Run `spec` to completion, or until `ctx` is cancelled.
    ///
    /// A non-zero exit is not an error at this level; callers inspect
    /// [`CommandOutput::code`].
    fn run<'a>(
        &'a self,
        ctx: &'a Context,
        spec: CommandSpec,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + 'a>>;
}

/// Executor backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct RealCommandExecutor {
    kill_grace_period: Duration,
}

impl RealCommandExecutor {
    /// `kill_grace_period` is how long a cancelled process gets between
    /// SIGTERM and SIGKILL.
    pub fn new(kill_grace_period: Duration) -> Self {
        Self { kill_grace_period }
    }
}

impl Default for RealCommandExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn run<'a>(
        &'a self,
        ctx: &'a Context,
        spec: CommandSpec,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + 'a>> {
        Box::pin(run_command(ctx, spec, self.kill_grace_period))
    }
}
