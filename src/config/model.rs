// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Store configuration as read from a TOML file.
///
/// ```toml
/// root_dir = "/var/lib/tfworkspace"
/// kill_grace_period = "10s"
///
/// [terraform]
/// binary = "terraform"
/// plugin_cache_dir = "/var/cache/terraform-plugins"
///
/// [provider]
/// binary = "/usr/local/bin/terraform-provider-aws"
/// args = ["-debuggable"]
/// start_timeout = "30s"
/// ```
///
/// All sections are optional and have reasonable defaults. Without a
/// `[provider]` section terraform launches its own plugins.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStoreConfig {
    /// Parent of the per-resource workspace directories. Defaults to the
    /// system temp dir.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Time between SIGTERM and SIGKILL for cancelled commands.
    #[serde(default = "default_kill_grace_period")]
    pub kill_grace_period: String,

    #[serde(default)]
    pub terraform: TerraformSection,

    #[serde(default)]
    pub provider: Option<ProviderSection>,
}

impl Default for RawStoreConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            kill_grace_period: default_kill_grace_period(),
            terraform: TerraformSection::default(),
            provider: None,
        }
    }
}

/// `[terraform]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerraformSection {
    #[serde(default = "default_terraform_binary")]
    pub binary: String,

    /// Exported as `TF_PLUGIN_CACHE_DIR` to every command when set.
    #[serde(default)]
    pub plugin_cache_dir: Option<PathBuf>,
}

impl Default for TerraformSection {
    fn default() -> Self {
        Self {
            binary: default_terraform_binary(),
            plugin_cache_dir: None,
        }
    }
}

/// `[provider]` section: the shared provider process.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    pub binary: String,

    #[serde(default = "default_provider_args")]
    pub args: Vec<String>,

    #[serde(default = "default_start_timeout")]
    pub start_timeout: String,
}

fn default_kill_grace_period() -> String {
    "10s".to_string()
}

fn default_terraform_binary() -> String {
    "terraform".to_string()
}

fn default_provider_args() -> Vec<String> {
    vec!["-debuggable".to_string()]
}

fn default_start_timeout() -> String {
    "30s".to_string()
}

/// Validated configuration used by the rest of the crate.
///
/// Built from [`RawStoreConfig`] via `TryFrom`, which checks every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub root_dir: Option<PathBuf>,
    pub kill_grace_period: Duration,
    pub terraform_binary: String,
    pub plugin_cache_dir: Option<PathBuf>,
    pub provider: Option<ProviderConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub binary: String,
    pub args: Vec<String>,
    pub start_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            kill_grace_period: Duration::from_secs(10),
            terraform_binary: default_terraform_binary(),
            plugin_cache_dir: None,
            provider: None,
        }
    }
}

impl StoreConfig {
    /// Environment every terraform command gets from configuration alone.
    pub fn base_env(&self) -> Vec<String> {
        let mut env = Vec::new();
        if let Some(dir) = &self.plugin_cache_dir {
            env.push(format!("TF_PLUGIN_CACHE_DIR={}", dir.display()));
        }
        env
    }
}
