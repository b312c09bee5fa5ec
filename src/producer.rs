// src/producer.rs

//! File producer: renders the artifacts a workspace needs before any
//! terraform command runs.
//!
//! - `main.tf.json`: provider requirement, provider configuration and the
//!   single resource block, in terraform's JSON configuration syntax.
//! - `terraform.tfstate`: a state (format v4) reconstructed from the
//!   resource's last observation, so terraform does not treat an existing
//!   resource as new.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde_json::{json, Value};
use tracing::debug;

use crate::fs::FileSystem;
use crate::resource::{resolve_sensitive_parameters, Attributes, ManagedResource, ResourceConfig, SecretClient};
use crate::types::{Context, ResourceUid, Setup};

pub const MAIN_TF_FILE: &str = "main.tf.json";
pub const STATE_FILE: &str = "terraform.tfstate";
pub const LOCK_FILE: &str = ".terraform.lock.hcl";

/// Everything needed to render a workspace's files, captured once.
#[derive(Debug, Clone)]
pub struct FileProducer {
    pub dir: PathBuf,
    uid: ResourceUid,
    resource_type: String,
    resource_name: String,
    id_field_name: String,
    schema_version: u64,
    external_name: Option<String>,
    parameters: Attributes,
    observation: Attributes,
    private_state: Option<String>,
    being_deleted: bool,
    setup: Setup,
}

impl FileProducer {
    /// Collect parameters (with sensitive values resolved through `client`)
    /// and observation from `resource`.
    pub async fn new(
        ctx: &Context,
        client: &dyn SecretClient,
        dir: impl Into<PathBuf>,
        resource: &dyn ManagedResource,
        setup: &Setup,
        cfg: &ResourceConfig,
    ) -> Result<Self> {
        let mut parameters = resource.parameters().context("cannot get parameters")?;
        resolve_sensitive_parameters(ctx, client, &mut parameters, cfg)
            .await
            .context("cannot resolve sensitive parameters")?;
        for field in &cfg.ignored_fields {
            parameters.remove(field);
        }

        let external_name = resource.external_name().filter(|n| !n.is_empty());
        if let (Some(arg), Some(name)) = (&cfg.identifier_argument, &external_name) {
            parameters.insert(arg.clone(), Value::String(name.clone()));
        }

        let observation = resource.observation().context("cannot get observation")?;

        Ok(Self {
            dir: dir.into(),
            uid: resource.uid(),
            resource_type: cfg.name.clone(),
            resource_name: resource.name(),
            id_field_name: cfg.id_field_name.clone(),
            schema_version: cfg.schema_version,
            external_name,
            parameters,
            observation,
            private_state: resource.private_state(),
            being_deleted: resource.is_being_deleted(),
            setup: setup.clone(),
        })
    }

    pub fn main_tf_path(&self) -> PathBuf {
        self.dir.join(MAIN_TF_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Terraform JSON configuration for the resource.
    pub fn main_tf(&self) -> Value {
        let provider = self.setup.requirement.name();

        let mut resource = self.parameters.clone();
        // Deletion protection is lifted only while the resource is being deleted.
        resource.insert(
            "lifecycle".to_string(),
            json!({ "prevent_destroy": !self.being_deleted }),
        );

        let mut terraform = json!({
            "required_providers": {
                provider: {
                    "source": self.setup.requirement.source,
                    "version": self.setup.requirement.version,
                }
            }
        });
        if !self.setup.version.is_empty() {
            terraform["required_version"] = Value::String(self.setup.version.clone());
        }

        json!({
            "terraform": terraform,
            "provider": { provider: self.setup.configuration },
            "resource": {
                &self.resource_type: { &self.resource_name: resource }
            }
        })
    }

    /// Reconstructed state. Observation takes precedence over parameters; the
    /// id is the external name, falling back to an observed id.
    pub fn tf_state(&self) -> Value {
        let mut attributes = self.parameters.clone();
        for (k, v) in &self.observation {
            attributes.insert(k.clone(), v.clone());
        }
        if let Some(name) = &self.external_name {
            attributes.insert(self.id_field_name.clone(), Value::String(name.clone()));
        }

        let mut instance = json!({
            "schema_version": self.schema_version,
            "attributes": attributes,
            "sensitive_attributes": [],
        });
        if let Some(private) = &self.private_state {
            instance["private"] = Value::String(private.clone());
        }

        json!({
            "version": 4,
            "terraform_version": self.setup.version,
            "serial": 1,
            "lineage": self.uid.as_str(),
            "outputs": {},
            "resources": [{
                "mode": "managed",
                "type": self.resource_type,
                "name": self.resource_name,
                "provider": format!(
                    "provider[\"registry.terraform.io/{}\"]",
                    self.setup.requirement.source
                ),
                "instances": [instance],
            }]
        })
    }

    pub fn write_main_tf(&self, fs: &dyn FileSystem) -> Result<()> {
        write_json(fs, &self.main_tf_path(), &self.main_tf())
    }

    pub fn write_tf_state(&self, fs: &dyn FileSystem) -> Result<()> {
        write_json(fs, &self.state_path(), &self.tf_state())
    }
}

fn write_json(fs: &dyn FileSystem, path: &Path, value: &Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).context("cannot serialize")?;
    debug!(path = ?path, bytes = bytes.len(), "writing workspace file");
    fs.write(path, &bytes)
}

/// Attributes of the single resource instance in a state document, if any.
pub fn state_attributes(state: &Value) -> Option<Attributes> {
    state
        .get("resources")?
        .as_array()?
        .first()?
        .get("instances")?
        .as_array()?
        .first()?
        .get("attributes")?
        .as_object()
        .cloned()
}
