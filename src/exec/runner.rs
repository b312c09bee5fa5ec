// src/exec/runner.rs

//! Long-lived provider process shared by every workspace.
//!
//! Terraform can attach to an already running provider plugin instead of
//! launching a fresh one for every command. The plugin, when started in debug
//! mode, prints a line of the form
//!
//! ```text
//! TF_REATTACH_PROVIDERS='{"registry.terraform.io/hashicorp/aws":{...}}'
//! ```
//!
//! and every terraform invocation that exports that value reuses it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{Result, WorkspaceError};
use crate::types::Context;

/// Environment variable carrying the attachment configuration.
pub const ENV_REATTACH_CONFIG: &str = "TF_REATTACH_PROVIDERS";

fn reattach_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"TF_REATTACH_PROVIDERS='(.+)'").expect("valid reattach pattern"))
}

/// Starts (or reuses) the backing provider process and returns the value
/// for [`ENV_REATTACH_CONFIG`].
pub trait ProviderRunner: Send + Sync {
    fn start<'a>(
        &'a self,
        ctx: &'a Context,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// Runner that starts nothing; terraform launches its own plugins.
#[derive(Debug, Clone, Default)]
pub struct NoOpProviderRunner;

impl NoOpProviderRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProviderRunner for NoOpProviderRunner {
    fn start<'a>(
        &'a self,
        _ctx: &'a Context,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async { Ok(String::new()) })
    }
}

struct RunningProvider {
    // Killed on drop together with the runner.
    child: Child,
    reattach_config: String,
}

/// Runs one provider process in debug mode and hands out its attachment
/// configuration.
///
/// The first `start` launches the process and waits for the attachment line;
/// later calls return the cached value. If the process exits, the next
/// `start` launches a new one.
pub struct SharedProviderRunner {
    binary: String,
    args: Vec<String>,
    start_timeout: Duration,
    running: Mutex<Option<RunningProvider>>,
}

impl fmt::Debug for SharedProviderRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedProviderRunner")
            .field("binary", &self.binary)
            .field("args", &self.args)
            .field("start_timeout", &self.start_timeout)
            .finish_non_exhaustive()
    }
}

impl SharedProviderRunner {
    pub fn new(binary: impl Into<String>, args: Vec<String>, start_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            args,
            start_timeout,
            running: Mutex::new(None),
        }
    }

    async fn launch(&self, ctx: &Context) -> Result<RunningProvider> {
        info!(binary = %self.binary, args = ?self.args, "starting shared provider process");

        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning provider binary '{}'", self.binary))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("provider stdout is not piped"))?;
        let mut lines = BufReader::new(stdout).lines();

        let reattach_config = tokio::select! {
            res = tokio::time::timeout(self.start_timeout, scan_reattach_config(&mut lines)) => match res {
                Ok(found) => found.map_err(|e| WorkspaceError::setup("cannot start provider", e))?,
                Err(_) => {
                    return Err(WorkspaceError::setup(
                        "cannot start provider",
                        anyhow!("timed out after {:?} waiting for {ENV_REATTACH_CONFIG}", self.start_timeout),
                    ));
                }
            },
            _ = ctx.cancelled() => return Err(WorkspaceError::Cancelled),
        };

        // Keep draining stdout so the provider never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("provider stdout: {}", line);
            }
        });

        info!("shared provider process is ready");
        Ok(RunningProvider {
            child,
            reattach_config,
        })
    }
}

async fn scan_reattach_config(lines: &mut Lines<BufReader<ChildStdout>>) -> anyhow::Result<String> {
    while let Some(line) = lines.next_line().await.context("reading provider stdout")? {
        debug!("provider stdout: {}", line);
        if let Some(caps) = reattach_regex().captures(&line) {
            return Ok(caps[1].to_string());
        }
    }
    Err(anyhow!("provider exited before printing {ENV_REATTACH_CONFIG}"))
}

impl ProviderRunner for SharedProviderRunner {
    fn start<'a>(
        &'a self,
        ctx: &'a Context,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let mut running = self.running.lock().await;

            if let Some(provider) = running.as_mut() {
                match provider.child.try_wait() {
                    Ok(None) => return Ok(provider.reattach_config.clone()),
                    Ok(Some(status)) => {
                        warn!(?status, "shared provider process exited; restarting");
                    }
                    Err(e) => {
                        warn!(error = %e, "cannot poll shared provider process; restarting");
                    }
                }
            }

            let provider = self.launch(ctx).await?;
            let config = provider.reattach_config.clone();
            *running = Some(provider);
            Ok(config)
        })
    }
}
