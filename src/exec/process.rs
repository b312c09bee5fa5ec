// src/exec/process.rs

//! Single terraform process runner.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Result, WorkspaceError};
use crate::types::Context;

use super::backend::{CommandOutput, CommandSpec};

/// Run a command to completion, capturing stdout and stderr interleaved in
/// arrival order.
///
/// If `ctx` is cancelled first, the child gets SIGTERM, then SIGKILL once
/// `kill_grace_period` has passed, and `WorkspaceError::Cancelled` is returned.
pub async fn run_command(
    ctx: &Context,
    spec: CommandSpec,
    kill_grace_period: Duration,
) -> Result<CommandOutput> {
    if ctx.is_cancelled() {
        return Err(WorkspaceError::Cancelled);
    }

    debug!(cmd = %spec, dir = ?spec.dir, "starting process");

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.dir)
        .envs(spec.env_pairs())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning '{}' in {:?}", spec, spec.dir))?;

    let combined = Arc::new(Mutex::new(String::new()));
    let readers = [
        child.stdout.take().map(|s| spawn_reader(s, Arc::clone(&combined))),
        child.stderr.take().map(|s| spawn_reader(s, Arc::clone(&combined))),
    ];

    tokio::select! {
        status_res = child.wait() => {
            let status = status_res.with_context(|| format!("waiting for '{}'", spec))?;
            for handle in readers.into_iter().flatten() {
                if let Err(e) = handle.await {
                    warn!(cmd = %spec, error = %e, "output reader task failed");
                }
            }
            let output = std::mem::take(&mut *combined.lock());
            debug!(cmd = %spec, exit_code = ?status.code(), "process exited");
            Ok(CommandOutput { code: status.code(), output })
        }

        _ = ctx.cancelled() => {
            info!(cmd = %spec, "cancellation requested; terminating process");
            terminate(&mut child, kill_grace_period).await;
            Err(WorkspaceError::Cancelled)
        }
    }
}

fn spawn_reader<R>(stream: R, sink: Arc<Mutex<String>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut buf = sink.lock();
            buf.push_str(&line);
            buf.push('\n');
        }
    })
}

/// SIGTERM, wait up to `grace`, then SIGKILL.
async fn terminate(child: &mut Child, grace: Duration) {
    if stop_gracefully(child, grace).await {
        return;
    }
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill child process");
    }
}

/// Returns true if the child exited within `grace` after SIGTERM.
#[cfg(unix)]
async fn stop_gracefully(child: &mut Child, grace: Duration) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid, error = %e, "failed to send SIGTERM");
        return false;
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => true,
        Err(_) => {
            warn!(pid, ?grace, "process ignored SIGTERM; killing");
            false
        }
    }
}

#[cfg(not(unix))]
async fn stop_gracefully(_child: &mut Child, _grace: Duration) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", std::env::temp_dir()).args(["-c", script])
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let ctx = Context::new();
        let out = run_command(&ctx, sh("echo out; echo err 1>&2"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(out.success());
        assert!(out.output.contains("out\n"));
        assert!(out.output.contains("err\n"));
    }

    #[tokio::test]
    async fn reports_non_zero_exit() {
        let ctx = Context::new();
        let out = run_command(&ctx, sh("exit 3"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn passes_extra_env() {
        let ctx = Context::new();
        let spec = sh("echo $TFWS_TEST_VALUE").env(vec!["TFWS_TEST_VALUE=hello".to_string()]);
        let out = run_command(&ctx, spec, Duration::from_secs(1)).await.unwrap();
        assert_eq!(out.output, "hello\n");
    }

    #[tokio::test]
    async fn cancellation_terminates_process() {
        let ctx = Context::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let res = run_command(&ctx, sh("sleep 30"), Duration::from_secs(2)).await;
        assert!(matches!(res, Err(WorkspaceError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn already_cancelled_context_does_not_spawn() {
        let ctx = Context::new();
        ctx.cancel();
        let res = run_command(&ctx, sh("echo never"), Duration::from_secs(1)).await;
        assert!(matches!(res, Err(WorkspaceError::Cancelled)));
    }
}
