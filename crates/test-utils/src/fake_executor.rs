use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tfworkspace::errors::{Result, WorkspaceError};
use tfworkspace::exec::{CommandExecutor, CommandOutput, CommandSpec};
use tfworkspace::fs::mock::MockFileSystem;
use tfworkspace::producer::LOCK_FILE;
use tfworkspace::types::Context;

/// `terraform plan -json` summary for a resource that exists and has no
/// pending changes.
pub const PLAN_NO_CHANGES: &str =
    r#"{"type":"change_summary","changes":{"add":0,"change":0,"remove":0,"operation":"plan"}}"#;

/// A fake executor that:
/// - records every command it was asked to run
/// - returns scripted output per terraform subcommand (success otherwise)
/// - writes the lock file on a successful `init`, like terraform does
/// - optionally holds every command until the test releases it
#[derive(Clone)]
pub struct FakeExecutor {
    fs: MockFileSystem,
    executed: Arc<Mutex<Vec<CommandSpec>>>,
    scripts: Arc<Mutex<HashMap<String, CommandOutput>>>,
    gate: Option<Arc<Semaphore>>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl FakeExecutor {
    pub fn new(fs: MockFileSystem) -> Self {
        let fake = Self {
            fs,
            executed: Arc::new(Mutex::new(Vec::new())),
            scripts: Arc::new(Mutex::new(HashMap::new())),
            gate: None,
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
        };
        fake.script("plan", 0, PLAN_NO_CHANGES);
        fake
    }

    /// Hold every command until [`FakeExecutor::release`] is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `n` held commands finish.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Answer `terraform <subcommand>` with `code` and `output`.
    pub fn script(&self, subcommand: &str, code: i32, output: &str) {
        self.scripts.lock().unwrap().insert(
            subcommand.to_string(),
            CommandOutput {
                code: Some(code),
                output: output.to_string(),
            },
        );
    }

    pub fn executed(&self) -> Vec<CommandSpec> {
        self.executed.lock().unwrap().clone()
    }

    /// First argument of every recorded command, in order.
    pub fn subcommands(&self) -> Vec<String> {
        self.executed()
            .iter()
            .map(|s| s.args.first().cloned().unwrap_or_default())
            .collect()
    }

    pub fn count(&self, subcommand: &str) -> usize {
        self.subcommands().iter().filter(|s| *s == subcommand).count()
    }

    /// Commands currently inside `run`.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of commands ever observed running at once.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn output_for(&self, spec: &CommandSpec) -> CommandOutput {
        let sub = spec.args.first().map(String::as_str).unwrap_or_default();
        self.scripts
            .lock()
            .unwrap()
            .get(sub)
            .cloned()
            .unwrap_or(CommandOutput {
                code: Some(0),
                output: String::new(),
            })
    }
}

impl CommandExecutor for FakeExecutor {
    fn run<'a>(
        &'a self,
        ctx: &'a Context,
        spec: CommandSpec,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + 'a>> {
        Box::pin(async move {
            self.executed.lock().unwrap().push(spec.clone());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            let result = match &self.gate {
                Some(gate) => tokio::select! {
                    permit = gate.acquire() => {
                        if let Ok(permit) = permit {
                            permit.forget();
                        }
                        Ok(())
                    }
                    _ = ctx.cancelled() => Err(WorkspaceError::Cancelled),
                },
                None => Ok(()),
            };
            self.running.fetch_sub(1, Ordering::SeqCst);
            result?;

            let out = self.output_for(&spec);
            if spec.args.first().map(String::as_str) == Some("init") && out.success() {
                self.fs.add_file(spec.dir.join(LOCK_FILE), "# provider locks\n");
            }
            Ok(out)
        })
    }
}
