// src/resource.rs

//! Collaborator boundary: the managed resource object, the secret client and
//! the per-type resource configuration.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::types::{Context, ResourceUid};

/// JSON object used for parameters and observations.
pub type Attributes = Map<String, Value>;

/// Anything the platform tracks with a stable unique identifier.
pub trait Object: Send + Sync {
    fn uid(&self) -> ResourceUid;
}

/// A managed resource reconciled through terraform.
pub trait ManagedResource: Object {
    /// Object name; used as the terraform resource name.
    fn name(&self) -> String;

    /// Name of the resource in the external system, once known.
    fn external_name(&self) -> Option<String>;

    /// Desired parameters (`spec.forProvider`).
    fn parameters(&self) -> anyhow::Result<Attributes>;

    /// Last-known observed state (`status.atProvider`).
    fn observation(&self) -> anyhow::Result<Attributes>;

    /// True once deletion of the resource has been requested.
    fn is_being_deleted(&self) -> bool;

    /// Opaque terraform private state, if the resource carries one.
    fn private_state(&self) -> Option<String> {
        None
    }
}

/// Reference to a key inside a platform secret.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub namespace: String,
    pub key: String,
}

impl SecretKeySelector {
    fn from_value(v: &Value) -> Option<Self> {
        serde_json::from_value(v.clone()).ok()
    }
}

/// Reads credential material needed to render the configuration file.
pub trait SecretClient: Send + Sync {
    fn get_secret_value<'a>(
        &'a self,
        ctx: &'a Context,
        selector: &'a SecretKeySelector,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + 'a>>;
}

/// Schema-level metadata for one terraform resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Terraform resource type, e.g. `aws_s3_bucket`.
    pub name: String,
    /// Name of the id attribute in terraform state.
    pub id_field_name: String,
    /// Parameter that receives the external name, if any.
    pub identifier_argument: Option<String>,
    /// Top-level parameters never rendered into the configuration file.
    pub ignored_fields: Vec<String>,
    /// Terraform field path -> parameter path holding a [`SecretKeySelector`].
    pub sensitive_field_paths: BTreeMap<String, String>,
    /// Whether operations for this type should go through the asynchronous
    /// pipeline.
    pub use_async: bool,
    /// Schema version written into reconstructed state.
    pub schema_version: u64,
}

impl ResourceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field_name: "id".to_string(),
            identifier_argument: None,
            ignored_fields: Vec::new(),
            sensitive_field_paths: BTreeMap::new(),
            use_async: false,
            schema_version: 0,
        }
    }

    pub fn with_identifier_argument(mut self, field: impl Into<String>) -> Self {
        self.identifier_argument = Some(field.into());
        self
    }

    pub fn with_ignored_field(mut self, field: impl Into<String>) -> Self {
        self.ignored_fields.push(field.into());
        self
    }

    pub fn with_sensitive_field(mut self, tf_path: impl Into<String>, param_path: impl Into<String>) -> Self {
        self.sensitive_field_paths.insert(tf_path.into(), param_path.into());
        self
    }

    pub fn with_async(mut self, use_async: bool) -> Self {
        self.use_async = use_async;
        self
    }
}

/// Read a dotted path (`a.b.c`) from a JSON object.
pub fn get_path<'a>(obj: &'a Attributes, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = obj.get(segments.next()?)?;
    for seg in segments {
        current = current.as_object()?.get(seg)?;
    }
    Some(current)
}

/// Write `value` at a dotted path, creating intermediate objects.
pub fn set_path(obj: &mut Attributes, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut current = obj;
    for seg in segments {
        let entry = current
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

/// Remove the value at a dotted path. Returns what was removed.
pub fn remove_path(obj: &mut Attributes, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => obj.remove(path),
        Some((parent, last)) => {
            let mut current = obj;
            for seg in parent.split('.') {
                current = current.get_mut(seg)?.as_object_mut()?;
            }
            current.remove(last)
        }
    }
}

/// Resolve every sensitive parameter path to its secret value, moving it to
/// the terraform field path.
pub async fn resolve_sensitive_parameters(
    ctx: &Context,
    client: &dyn SecretClient,
    params: &mut Attributes,
    cfg: &ResourceConfig,
) -> anyhow::Result<()> {
    for (tf_path, param_path) in &cfg.sensitive_field_paths {
        let Some(raw) = remove_path(params, param_path) else {
            continue;
        };
        let Some(selector) = SecretKeySelector::from_value(&raw) else {
            anyhow::bail!("parameter {param_path} is not a secret key selector");
        };
        let bytes = client.get_secret_value(ctx, &selector).await.map_err(|e| {
            e.context(format!(
                "cannot get secret {}/{} key {} for {tf_path}",
                selector.namespace, selector.name, selector.key
            ))
        })?;
        let value = String::from_utf8(bytes)
            .map_err(|e| anyhow::anyhow!("secret value for {tf_path} is not UTF-8: {e}"))?;
        set_path(params, tf_path, Value::String(value));
    }
    Ok(())
}

/// Terraform id of the resource, read from its observation. Empty when
/// unknown.
pub fn extract_resource_id(resource: &dyn ManagedResource, id_field_name: &str) -> String {
    resource
        .observation()
        .ok()
        .and_then(|obs| obs.get(id_field_name).and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

/// String parameter at a dotted path. Empty when missing or not a string.
pub fn extract_param_path(resource: &dyn ManagedResource, path: &str) -> String {
    resource
        .parameters()
        .ok()
        .and_then(|params| get_path(&params, path).and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(v: Value) -> Attributes {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn dotted_paths() {
        let mut a = attrs(json!({ "a": { "b": { "c": "x" } }, "d": 1 }));
        assert_eq!(get_path(&a, "a.b.c"), Some(&json!("x")));
        assert_eq!(get_path(&a, "a.z"), None);
        assert_eq!(get_path(&a, "d.e"), None);

        set_path(&mut a, "a.b.e", json!(2));
        set_path(&mut a, "n.m", json!(true));
        assert_eq!(get_path(&a, "a.b.e"), Some(&json!(2)));
        assert_eq!(get_path(&a, "n.m"), Some(&json!(true)));

        assert_eq!(remove_path(&mut a, "a.b.c"), Some(json!("x")));
        assert_eq!(remove_path(&mut a, "a.b.c"), None);
        assert_eq!(remove_path(&mut a, "d"), Some(json!(1)));
    }

    struct StaticSecrets;

    impl SecretClient for StaticSecrets {
        fn get_secret_value<'a>(
            &'a self,
            _ctx: &'a Context,
            selector: &'a SecretKeySelector,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + 'a>> {
            Box::pin(async move {
                if selector.key == "password" {
                    Ok(b"hunter2".to_vec())
                } else {
                    anyhow::bail!("no such key {}", selector.key)
                }
            })
        }
    }

    #[tokio::test]
    async fn sensitive_parameters_are_resolved() {
        let ctx = Context::new();
        let cfg = ResourceConfig::new("aws_db_instance")
            .with_sensitive_field("password", "passwordSecretRef");
        let mut params = attrs(json!({
            "engine": "postgres",
            "passwordSecretRef": { "name": "db", "namespace": "default", "key": "password" }
        }));

        resolve_sensitive_parameters(&ctx, &StaticSecrets, &mut params, &cfg)
            .await
            .unwrap();

        assert_eq!(params.get("password"), Some(&json!("hunter2")));
        assert!(params.get("passwordSecretRef").is_none());
    }

    #[tokio::test]
    async fn missing_secret_is_an_error() {
        let ctx = Context::new();
        let cfg = ResourceConfig::new("aws_db_instance")
            .with_sensitive_field("password", "passwordSecretRef");
        let mut params = attrs(json!({
            "passwordSecretRef": { "name": "db", "namespace": "default", "key": "other" }
        }));

        let err = resolve_sensitive_parameters(&ctx, &StaticSecrets, &mut params, &cfg)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("cannot get secret default/db key other"));
    }

    struct Observed {
        params: Option<Value>,
        observation: Value,
    }

    impl Object for Observed {
        fn uid(&self) -> ResourceUid {
            ResourceUid::new("abc-123")
        }
    }

    impl ManagedResource for Observed {
        fn name(&self) -> String {
            "db".to_string()
        }
        fn external_name(&self) -> Option<String> {
            None
        }
        fn parameters(&self) -> anyhow::Result<Attributes> {
            match &self.params {
                Some(v) => Ok(attrs(v.clone())),
                None => anyhow::bail!("spec.forProvider is not an object"),
            }
        }
        fn observation(&self) -> anyhow::Result<Attributes> {
            Ok(attrs(self.observation.clone()))
        }
        fn is_being_deleted(&self) -> bool {
            false
        }
    }

    fn observed() -> Observed {
        Observed {
            params: Some(json!({ "settings": { "tier": "db-f1-micro", "size": 10 } })),
            observation: json!({ "id": "projects/p/instances/db", "port": 5432 }),
        }
    }

    #[test]
    fn resource_id_comes_from_observation() {
        let res = observed();
        assert_eq!(extract_resource_id(&res, "id"), "projects/p/instances/db");
        assert_eq!(extract_resource_id(&res, "self_link"), "");
        assert_eq!(extract_resource_id(&res, "port"), "");
    }

    #[test]
    fn param_path_is_read_or_empty() {
        let res = observed();
        assert_eq!(extract_param_path(&res, "settings.tier"), "db-f1-micro");
        assert_eq!(extract_param_path(&res, "settings.disk"), "");
        assert_eq!(extract_param_path(&res, "settings.size"), "");
        assert_eq!(extract_param_path(&res, "settings"), "");

        let broken = Observed {
            params: None,
            ..observed()
        };
        assert_eq!(extract_param_path(&broken, "settings.tier"), "");
    }
}
