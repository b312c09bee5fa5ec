use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::redact::ConfigurationRedactor;

/// Cancellation-bearing context accepted by every entry point.
///
/// Cancelling it terminates any terraform process started on its behalf.
pub type Context = CancellationToken;

/// Stable unique identifier assigned to a managed resource by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct ResourceUid(String);

impl ResourceUid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceUid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Terraform provider requirement rendered into `required_providers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderRequirement {
    /// Registry source, e.g. `hashicorp/aws`.
    pub source: String,
    pub version: String,
}

impl ProviderRequirement {
    /// Local provider name: the last segment of `source`.
    pub fn name(&self) -> &str {
        self.source.rsplit('/').next().unwrap_or(&self.source)
    }
}

/// Provider configuration body. Every string inside it is considered
/// sensitive.
pub type ProviderConfiguration = BTreeMap<String, Value>;

/// Per-request terraform setup supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Setup {
    /// Terraform version constraint.
    pub version: String,
    pub requirement: ProviderRequirement,
    pub configuration: ProviderConfiguration,
    /// Extra environment variables in `KEY=VALUE` form.
    pub env: Vec<String>,
}

impl Setup {
    /// Redaction strategy that scrubs every configuration string.
    pub fn redactor(&self) -> ConfigurationRedactor {
        ConfigurationRedactor::from_configuration(&self.configuration)
    }
}
