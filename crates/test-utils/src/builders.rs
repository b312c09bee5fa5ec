#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use anyhow::anyhow;
use serde_json::Value;
use tfworkspace::resource::{Attributes, ManagedResource, Object, SecretClient, SecretKeySelector};
use tfworkspace::types::{Context, ProviderRequirement, ResourceUid, Setup};

/// Builder for `Setup` to simplify test setup.
pub struct SetupBuilder {
    setup: Setup,
}

impl SetupBuilder {
    pub fn new() -> Self {
        Self {
            setup: Setup {
                version: "1.5.7".to_string(),
                requirement: ProviderRequirement {
                    source: "hashicorp/aws".to_string(),
                    version: "5.31.0".to_string(),
                },
                configuration: Default::default(),
                env: Vec::new(),
            },
        }
    }

    pub fn with_config(mut self, key: &str, value: Value) -> Self {
        self.setup.configuration.insert(key.to_string(), value);
        self
    }

    pub fn with_env(mut self, kv: &str) -> Self {
        self.setup.env.push(kv.to_string());
        self
    }

    pub fn build(self) -> Setup {
        self.setup
    }
}

impl Default for SetupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Managed resource with plain in-memory fields.
#[derive(Debug, Clone)]
pub struct FakeResource {
    pub uid: String,
    pub name: String,
    pub external_name: Option<String>,
    pub parameters: Attributes,
    pub observation: Attributes,
    pub deleting: bool,
}

impl FakeResource {
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            name: format!("res-{uid}"),
            external_name: None,
            parameters: Attributes::new(),
            observation: Attributes::new(),
            deleting: false,
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn with_observation(mut self, key: &str, value: Value) -> Self {
        self.observation.insert(key.to_string(), value);
        self
    }

    pub fn with_external_name(mut self, name: &str) -> Self {
        self.external_name = Some(name.to_string());
        self
    }
}

impl Object for FakeResource {
    fn uid(&self) -> ResourceUid {
        ResourceUid::new(self.uid.clone())
    }
}

impl ManagedResource for FakeResource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn external_name(&self) -> Option<String> {
        self.external_name.clone()
    }

    fn parameters(&self) -> anyhow::Result<Attributes> {
        Ok(self.parameters.clone())
    }

    fn observation(&self) -> anyhow::Result<Attributes> {
        Ok(self.observation.clone())
    }

    fn is_being_deleted(&self) -> bool {
        self.deleting
    }
}

/// Secret client serving values from a map keyed by `namespace/name/key`.
#[derive(Debug, Clone, Default)]
pub struct FakeSecretClient {
    secrets: HashMap<String, Vec<u8>>,
}

impl FakeSecretClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, namespace: &str, name: &str, key: &str, value: &str) -> Self {
        self.secrets
            .insert(format!("{namespace}/{name}/{key}"), value.as_bytes().to_vec());
        self
    }
}

impl SecretClient for FakeSecretClient {
    fn get_secret_value<'a>(
        &'a self,
        _ctx: &'a Context,
        selector: &'a SecretKeySelector,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + 'a>> {
        let key = format!("{}/{}/{}", selector.namespace, selector.name, selector.key);
        Box::pin(async move {
            self.secrets
                .get(&key)
                .cloned()
                .ok_or_else(|| anyhow!("secret {key} not found"))
        })
    }
}
