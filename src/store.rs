// src/store.rs

//! Registry of workspaces, one per managed resource.
//!
//! The store prepares the workspace directory on every request (so the
//! configuration file always reflects the latest parameters) and hands out a
//! shared [`Workspace`] handle. The registry lock only guards the map; the
//! filesystem and process work of a request happens outside it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, info_span, warn};

use crate::config::StoreConfig;
use crate::errors::{Result, WorkspaceError};
use crate::exec::{
    CommandExecutor, NoOpProviderRunner, ProviderRunner, RealCommandExecutor, SharedProviderRunner,
    ENV_REATTACH_CONFIG,
};
use crate::fs::{FileSystem, RealFileSystem};
use crate::producer::FileProducer;
use crate::resource::{ManagedResource, Object, ResourceConfig, SecretClient};
use crate::types::{Context, ResourceUid, Setup};
use crate::workspace::Workspace;

/// Owns every live [`Workspace`].
pub struct WorkspaceStore {
    store: Mutex<HashMap<ResourceUid, Arc<Workspace>>>,
    fs: Arc<dyn FileSystem>,
    executor: Arc<dyn CommandExecutor>,
    provider_runner: Arc<dyn ProviderRunner>,
    config: StoreConfig,
}

impl std::fmt::Debug for WorkspaceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceStore")
            .field("root_dir", &self.root_dir())
            .field("workspaces", &self.len())
            .finish_non_exhaustive()
    }
}

impl WorkspaceStore {
    /// Store backed by the real filesystem and process executor.
    ///
    /// A `[provider]` section in `config` enables the shared provider
    /// process; otherwise terraform launches its own plugins.
    pub fn new(config: StoreConfig) -> Self {
        let provider_runner: Arc<dyn ProviderRunner> = match &config.provider {
            Some(p) => Arc::new(SharedProviderRunner::new(
                p.binary.clone(),
                p.args.clone(),
                p.start_timeout,
            )),
            None => Arc::new(NoOpProviderRunner::new()),
        };
        Self {
            store: Mutex::new(HashMap::new()),
            fs: Arc::new(RealFileSystem),
            executor: Arc::new(RealCommandExecutor::new(config.kill_grace_period)),
            provider_runner,
            config,
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_provider_runner(mut self, runner: Arc<dyn ProviderRunner>) -> Self {
        self.provider_runner = runner;
        self
    }

    /// Parent directory of every workspace.
    pub fn root_dir(&self) -> PathBuf {
        self.config
            .root_dir
            .clone()
            .unwrap_or_else(|| self.fs.temp_dir())
    }

    fn dir_for(&self, uid: &ResourceUid) -> PathBuf {
        self.root_dir().join(uid.as_str())
    }

    /// Number of registered workspaces.
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Registered workspace for `uid`, without preparing anything.
    pub fn get(&self, uid: &ResourceUid) -> Option<Arc<Workspace>> {
        self.store.lock().get(uid).cloned()
    }

    /// Prepare the directory of `resource` and return its workspace,
    /// registering a new one on first access.
    ///
    /// The configuration file is rewritten on every call; the state file is
    /// only written when missing. Newly registered workspaces are initialized
    /// before being returned.
    pub async fn workspace(
        &self,
        ctx: &Context,
        client: &dyn SecretClient,
        resource: &dyn ManagedResource,
        setup: &Setup,
        cfg: &ResourceConfig,
    ) -> Result<Arc<Workspace>> {
        let uid = resource.uid();
        let dir = self.dir_for(&uid);

        self.fs
            .create_dir_all(&dir)
            .map_err(|e| WorkspaceError::setup("cannot create directory for workspace", e))?;

        let fp = FileProducer::new(ctx, client, &dir, resource, setup, cfg)
            .await
            .map_err(|e| WorkspaceError::setup("cannot create a new file producer", e))?;

        let has_state = self
            .fs
            .try_exists(&fp.state_path())
            .map_err(|e| WorkspaceError::setup("cannot stat terraform.tfstate file", e))?;
        if !has_state {
            fp.write_tf_state(self.fs.as_ref())
                .map_err(|e| WorkspaceError::setup("cannot reproduce tfstate file", e))?;
        }
        fp.write_main_tf(self.fs.as_ref())
            .map_err(|e| WorkspaceError::setup("cannot write main tf file", e))?;

        let attachment = self.provider_runner.start(ctx).await?;

        let ws = {
            let mut store = self.store.lock();
            Arc::clone(
                store
                    .entry(uid.clone())
                    .or_insert_with(|| Arc::new(self.new_workspace(&uid, &dir, setup))),
            )
        };

        let mut env = self.config.base_env();
        env.extend(setup.env.iter().cloned());
        env.push(format!("{ENV_REATTACH_CONFIG}={attachment}"));
        ws.set_env(env);

        ws.ensure_initialized(ctx).await?;
        debug!(uid = %uid, "workspace is ready");
        Ok(ws)
    }

    fn new_workspace(&self, uid: &ResourceUid, dir: &Path, setup: &Setup) -> Workspace {
        info!(uid = %uid, dir = ?dir, "registering workspace");
        Workspace::new(dir, Arc::clone(&self.executor), Arc::clone(&self.fs))
            .with_terraform_binary(self.config.terraform_binary.clone())
            .with_filter(Arc::new(setup.redactor()))
            .with_span(info_span!("workspace", uid = %uid))
    }

    /// Remove the workspace of `obj` and its directory.
    ///
    /// Removing an unknown resource is a no-op. If the directory cannot be
    /// removed the workspace stays registered, so a later call retries.
    pub fn remove(&self, obj: &dyn Object) -> Result<()> {
        let uid = obj.uid();
        // Held across the removal so lookup, delete and unregister are one
        // step; a concurrent `workspace()` never sees a half-removed entry.
        let mut store = self.store.lock();
        let Some(ws) = store.get(&uid) else {
            return Ok(());
        };
        if let Err(e) = self.fs.remove_dir_all(ws.dir()) {
            warn!(uid = %uid, error = %e, "cannot remove workspace folder");
            return Err(WorkspaceError::Removal {
                dir: ws.dir().to_path_buf(),
                source: e,
            });
        }
        store.remove(&uid);
        info!(uid = %uid, "workspace removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    use serde_json::json;

    use crate::exec::{CommandOutput, CommandSpec};
    use crate::fs::mock::MockFileSystem;
    use crate::producer::{LOCK_FILE, STATE_FILE};
    use crate::resource::{Attributes, SecretKeySelector};

    /// Succeeds on every command; `init` writes the lock file.
    #[derive(Debug)]
    struct InitOnly {
        fs: MockFileSystem,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl CommandExecutor for InitOnly {
        fn run<'a>(
            &'a self,
            _ctx: &'a Context,
            spec: CommandSpec,
        ) -> Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + 'a>> {
            Box::pin(async move {
                if spec.args.first().map(String::as_str) == Some("init") {
                    self.fs.add_file(spec.dir.join(LOCK_FILE), "");
                }
                self.calls.lock().push(spec);
                Ok(CommandOutput {
                    code: Some(0),
                    output: String::new(),
                })
            })
        }
    }

    struct Res(&'static str);

    impl Object for Res {
        fn uid(&self) -> ResourceUid {
            ResourceUid::new(self.0)
        }
    }

    impl ManagedResource for Res {
        fn name(&self) -> String {
            "example".to_string()
        }
        fn external_name(&self) -> Option<String> {
            None
        }
        fn parameters(&self) -> anyhow::Result<Attributes> {
            Ok(Attributes::new())
        }
        fn observation(&self) -> anyhow::Result<Attributes> {
            Ok(Attributes::new())
        }
        fn is_being_deleted(&self) -> bool {
            false
        }
    }

    struct NoSecrets;

    impl SecretClient for NoSecrets {
        fn get_secret_value<'a>(
            &'a self,
            _ctx: &'a Context,
            _selector: &'a SecretKeySelector,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + 'a>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn store(fs: &MockFileSystem) -> (WorkspaceStore, Arc<InitOnly>) {
        let exec = Arc::new(InitOnly {
            fs: fs.clone(),
            calls: Mutex::new(Vec::new()),
        });
        let store = WorkspaceStore::new(StoreConfig::default())
            .with_fs(Arc::new(fs.clone()))
            .with_executor(exec.clone());
        (store, exec)
    }

    fn setup() -> Setup {
        Setup {
            env: vec!["AWS_REGION=eu-west-1".to_string()],
            configuration: [("token".to_string(), json!("s3cr3t"))].into_iter().collect(),
            ..Setup::default()
        }
    }

    #[tokio::test]
    async fn second_request_reuses_workspace_and_skips_init() {
        let fs = MockFileSystem::new();
        let (store, exec) = store(&fs);
        let ctx = Context::new();
        let cfg = ResourceConfig::new("null_resource");

        let a = store.workspace(&ctx, &NoSecrets, &Res("abc-123"), &setup(), &cfg).await.unwrap();
        let b = store.workspace(&ctx, &NoSecrets, &Res("abc-123"), &setup(), &cfg).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
        assert_eq!(a.dir(), Path::new("/tmp/abc-123"));
        assert_eq!(exec.calls.lock().len(), 1);
        assert!(fs.exists(Path::new("/tmp/abc-123/main.tf.json")));
        assert!(fs.exists(&Path::new("/tmp/abc-123").join(STATE_FILE)));
    }

    #[tokio::test]
    async fn environment_carries_setup_env_and_attachment() {
        let fs = MockFileSystem::new();
        let (store, exec) = store(&fs);
        let ws = store
            .workspace(&Context::new(), &NoSecrets, &Res("u1"), &setup(), &ResourceConfig::new("null_resource"))
            .await
            .unwrap();

        let env = ws.env();
        assert_eq!(env, vec!["AWS_REGION=eu-west-1".to_string(), "TF_REATTACH_PROVIDERS=".to_string()]);
        assert_eq!(exec.calls.lock()[0].env, env);
    }

    #[tokio::test]
    async fn mkdir_failure_is_fatal_and_registers_nothing() {
        let fs = MockFileSystem::new();
        fs.fail_mkdir_of("/tmp/u2");
        let (store, exec) = store(&fs);

        let err = store
            .workspace(&Context::new(), &NoSecrets, &Res("u2"), &setup(), &ResourceConfig::new("null_resource"))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("cannot create directory for workspace"));
        assert!(store.is_empty());
        assert!(exec.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn remove_unknown_resource_is_noop() {
        let fs = MockFileSystem::new();
        fs.add_file("/tmp/ghost/main.tf.json", "{}");
        let (store, _) = store(&fs);

        store.remove(&Res("ghost")).unwrap();
        assert!(fs.exists(Path::new("/tmp/ghost/main.tf.json")));
    }
}
