// src/workspace/mod.rs

//! Execution context of one managed resource.
//!
//! A [`Workspace`] owns a directory, an environment and the exclusive right
//! to run terraform in that directory. Every invocation:
//!
//! - runs with the workspace directory as working directory and the
//!   accumulated environment,
//! - holds the workspace execution lock, so at most one terraform process
//!   runs per workspace at any instant,
//! - passes its combined output through the bound [`OutputFilter`] before
//!   anything is logged or returned.
//!
//! Long operations can also be started in the background through
//! [`pipeline`]; their status is reported through the error taxonomy in
//! [`crate::errors`].

pub mod pipeline;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::errors::{OperationKind, PipelineState, Result, WorkspaceError};
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
use crate::fs::FileSystem;
use crate::producer::{state_attributes, LOCK_FILE, STATE_FILE};
use crate::redact::OutputFilter;
use crate::resource::{Attributes, ResourceConfig};
use crate::types::Context;

use pipeline::Pipeline;
pub use pipeline::AsyncResult;

/// Outcome of `terraform plan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanResult {
    /// False when terraform would have to create the resource.
    pub exists: bool,
    /// True when no in-place changes are pending.
    pub up_to_date: bool,
}

/// Outcome of `terraform apply`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResult {
    /// Attributes of the resource in the resulting state.
    pub state: Option<Attributes>,
}

/// Outcome of a refresh-only apply.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshResult {
    pub exists: bool,
    pub state: Option<Attributes>,
}

/// Isolated directory, environment and execution rights for one resource.
pub struct Workspace {
    dir: PathBuf,
    env: RwLock<Vec<String>>,
    terraform_binary: String,
    executor: Arc<dyn CommandExecutor>,
    fs: Arc<dyn FileSystem>,
    filter: Arc<dyn OutputFilter>,
    span: Span,
    exec_lock: tokio::sync::Mutex<()>,
    pipeline: Mutex<Pipeline>,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("dir", &self.dir)
            .field("terraform_binary", &self.terraform_binary)
            .field("pipeline", &self.pipeline_state())
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Create a workspace bound to `dir`. Output is not filtered until
    /// [`Workspace::with_filter`] is applied.
    pub fn new(
        dir: impl Into<PathBuf>,
        executor: Arc<dyn CommandExecutor>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let dir = dir.into();
        let span = info_span!("workspace", dir = %dir.display());
        Self {
            dir,
            env: RwLock::new(Vec::new()),
            terraform_binary: "terraform".to_string(),
            executor,
            fs,
            filter: Arc::new(|s: &str| s.to_string()),
            span,
            exec_lock: tokio::sync::Mutex::new(()),
            pipeline: Mutex::new(Pipeline::default()),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn OutputFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_terraform_binary(mut self, binary: impl Into<String>) -> Self {
        self.terraform_binary = binary.into();
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current environment, `KEY=VALUE`.
    pub fn env(&self) -> Vec<String> {
        self.env.read().clone()
    }

    /// Replace the environment used by every later command.
    pub fn set_env(&self, env: Vec<String>) {
        *self.env.write() = env;
    }

    /// Apply the bound redaction to arbitrary text.
    pub fn redact(&self, s: &str) -> String {
        self.filter.filter(s)
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.pipeline.lock().state()
    }

    /// True once `terraform init` has produced its lock file.
    pub fn is_initialized(&self) -> Result<bool> {
        self.fs
            .try_exists(&self.dir.join(LOCK_FILE))
            .map_err(|e| WorkspaceError::setup("cannot stat init lock file", e))
    }

    /// Run `terraform init` unless the directory is already initialized.
    ///
    /// An initialized workspace returns without waiting for the execution
    /// lock, so a running background operation never delays the caller.
    /// Otherwise the check is repeated under the lock, so concurrent callers
    /// initialize once.
    pub async fn ensure_initialized(&self, ctx: &Context) -> Result<()> {
        if self.is_initialized()? {
            return Ok(());
        }
        let _guard = self.exec_lock.lock().await;
        if self.is_initialized()? {
            debug!(parent: &self.span, "workspace initialized concurrently");
            return Ok(());
        }
        self.init_locked(ctx).await
    }

    /// Run `terraform init` unconditionally.
    pub async fn init(&self, ctx: &Context) -> Result<()> {
        let _guard = self.exec_lock.lock().await;
        self.init_locked(ctx).await
    }

    async fn init_locked(&self, ctx: &Context) -> Result<()> {
        let out = self
            .run_locked(ctx, OperationKind::Init, &["init", "-input=false"])
            .await?;
        debug!(parent: &self.span, out = %out.output, "init ended");
        if !out.success() {
            return Err(WorkspaceError::Init { output: out.output });
        }
        Ok(())
    }

    /// `terraform plan`; reports whether the resource exists and is up to date.
    pub async fn plan(&self, ctx: &Context) -> Result<PlanResult> {
        self.pipeline.lock().ensure_idle()?;
        let out = self
            .run_tool(
                ctx,
                OperationKind::Plan,
                &["plan", "-refresh=false", "-input=false", "-lock=false", "-json"],
            )
            .await?;
        parse_plan_output(&out.output)
    }

    /// `terraform apply`; returns the resulting state attributes.
    pub async fn apply(&self, ctx: &Context) -> Result<ApplyResult> {
        self.pipeline.lock().ensure_idle()?;
        self.apply_unchecked(ctx).await
    }

    async fn apply_unchecked(&self, ctx: &Context) -> Result<ApplyResult> {
        self.run_tool(
            ctx,
            OperationKind::Apply,
            &["apply", "-auto-approve", "-input=false", "-lock=false", "-json"],
        )
        .await?;
        Ok(ApplyResult {
            state: self.read_state_attributes()?,
        })
    }

    /// `terraform destroy`.
    pub async fn destroy(&self, ctx: &Context) -> Result<()> {
        self.pipeline.lock().ensure_idle()?;
        self.destroy_unchecked(ctx).await
    }

    async fn destroy_unchecked(&self, ctx: &Context) -> Result<()> {
        self.run_tool(
            ctx,
            OperationKind::Destroy,
            &["destroy", "-auto-approve", "-input=false", "-lock=false", "-json"],
        )
        .await?;
        Ok(())
    }

    /// Refresh-only apply; reports whether the resource still exists.
    pub async fn refresh(&self, ctx: &Context) -> Result<RefreshResult> {
        self.pipeline.lock().ensure_idle()?;
        self.run_tool(
            ctx,
            OperationKind::Refresh,
            &[
                "apply",
                "-refresh-only",
                "-auto-approve",
                "-input=false",
                "-lock=false",
                "-json",
            ],
        )
        .await?;
        let state = self.read_state_attributes()?;
        Ok(RefreshResult {
            exists: state.is_some(),
            state,
        })
    }

    /// Start `terraform apply` in the background and return immediately.
    ///
    /// Fails with `OperationInProgress` while another asynchronous operation
    /// is running or its result has not been fetched.
    pub fn apply_async(self: &Arc<Self>, ctx: &Context) -> Result<()> {
        self.spawn_operation(ctx, OperationKind::Apply)
    }

    /// Start `terraform destroy` in the background and return immediately.
    pub fn destroy_async(self: &Arc<Self>, ctx: &Context) -> Result<()> {
        self.spawn_operation(ctx, OperationKind::Destroy)
    }

    /// Apply the way `cfg` asks for: inline when `use_async` is unset,
    /// otherwise through the pipeline.
    ///
    /// Returns `None` when the apply was started in the background; its
    /// outcome is then collected with [`Workspace::fetch_result`].
    pub async fn apply_for(self: &Arc<Self>, ctx: &Context, cfg: &ResourceConfig) -> Result<Option<ApplyResult>> {
        if cfg.use_async {
            self.apply_async(ctx)?;
            return Ok(None);
        }
        self.apply(ctx).await.map(Some)
    }

    /// Destroy the way `cfg` asks for. Returns true if the destroy finished
    /// inline, false if it was started in the background.
    pub async fn destroy_for(self: &Arc<Self>, ctx: &Context, cfg: &ResourceConfig) -> Result<bool> {
        if cfg.use_async {
            self.destroy_async(ctx)?;
            return Ok(false);
        }
        self.destroy(ctx).await.map(|()| true)
    }

    /// Fetch the result of the last asynchronous operation.
    ///
    /// Fails with `PipelineInProgress(NotStarted | Running)` when there is
    /// nothing to fetch yet. A fetched result resets the pipeline.
    pub fn fetch_result(&self) -> Result<AsyncResult> {
        self.pipeline.lock().take()
    }

    fn spawn_operation(self: &Arc<Self>, ctx: &Context, kind: OperationKind) -> Result<()> {
        self.pipeline.lock().begin(kind)?;
        info!(parent: &self.span, op = %kind, "starting asynchronous operation");

        let guard = PipelineGuard {
            workspace: Arc::clone(self),
            kind,
            finished: false,
        };
        let ctx = ctx.clone();
        tokio::spawn(
            async move {
                let mut guard = guard;
                let ws = &guard.workspace;
                let result = match kind {
                    OperationKind::Destroy => {
                        ws.destroy_unchecked(&ctx).await.map(|()| AsyncResult::Destroyed)
                    }
                    _ => ws.apply_unchecked(&ctx).await.map(AsyncResult::Applied),
                };
                if let Err(e) = &result {
                    warn!(op = %kind, error = %e, "asynchronous operation failed");
                }
                guard.finish(result);
            }
            .instrument(self.span.clone()),
        );
        Ok(())
    }

    /// Run a terraform subcommand under the execution lock and fail on a
    /// non-zero exit.
    async fn run_tool(&self, ctx: &Context, kind: OperationKind, args: &[&str]) -> Result<CommandOutput> {
        let _guard = self.exec_lock.lock().await;
        let out = self.run_locked(ctx, kind, args).await?;
        if !out.success() {
            return Err(WorkspaceError::Command {
                kind,
                code: out.code,
                output: out.output,
            });
        }
        Ok(out)
    }

    /// The single place terraform is invoked. Callers hold `exec_lock`.
    async fn run_locked(&self, ctx: &Context, kind: OperationKind, args: &[&str]) -> Result<CommandOutput> {
        let spec = CommandSpec::new(&self.terraform_binary, &self.dir)
            .args(args.iter().copied())
            .env(self.env());

        let mut out = self
            .executor
            .run(ctx, spec)
            .instrument(self.span.clone())
            .await?;
        out.output = self.filter.filter(&out.output);

        debug!(
            parent: &self.span,
            op = %kind,
            exit_code = ?out.code,
            out = %out.output,
            "terraform command ended"
        );
        Ok(out)
    }

    fn read_state_attributes(&self) -> Result<Option<Attributes>> {
        let path = self.dir.join(STATE_FILE);
        let exists = self
            .fs
            .try_exists(&path)
            .map_err(|e| WorkspaceError::setup("cannot stat terraform.tfstate file", e))?;
        if !exists {
            return Ok(None);
        }
        let raw = self
            .fs
            .read_to_string(&path)
            .map_err(|e| WorkspaceError::setup("cannot read state file", e))?;
        let state: Value = serde_json::from_str(&raw)
            .context("cannot parse state file")
            .map_err(|e| WorkspaceError::setup("cannot read state file", e))?;
        Ok(state_attributes(&state))
    }
}

/// Moves the pipeline to `HasResultPendingFetch` even if the background task
/// is dropped before it finishes.
struct PipelineGuard {
    workspace: Arc<Workspace>,
    kind: OperationKind,
    finished: bool,
}

impl PipelineGuard {
    fn finish(&mut self, result: Result<AsyncResult>) {
        self.workspace.pipeline.lock().finish(self.kind, result);
        self.finished = true;
    }
}

impl Drop for PipelineGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.workspace.pipeline.lock().finish(
                self.kind,
                Err(WorkspaceError::Other(anyhow!("{} operation was aborted", self.kind))),
            );
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlanLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    changes: Option<ChangeSummary>,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeSummary {
    #[serde(default)]
    add: u64,
    #[serde(default)]
    change: u64,
}

/// Find the `change_summary` line of `terraform plan -json` output.
fn parse_plan_output(output: &str) -> Result<PlanResult> {
    let summary = output
        .lines()
        .filter_map(|line| serde_json::from_str::<PlanLine>(line).ok())
        .find(|line| line.kind == "change_summary")
        .and_then(|line| line.changes)
        .ok_or_else(|| {
            WorkspaceError::setup(
                "cannot parse plan output",
                anyhow!("no change_summary line in terraform output"),
            )
        })?;
    // Terraform plans to add the resource iff it does not exist yet.
    Ok(PlanResult {
        exists: summary.add == 0,
        up_to_date: summary.change == 0,
    })
}
