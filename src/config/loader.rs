// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawStoreConfig, StoreConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawStoreConfig`.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] for
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawStoreConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawStoreConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<StoreConfig> {
    let raw_config = load_from_path(&path)?;
    let config = StoreConfig::try_from(raw_config)?;
    Ok(config)
}

/// Default config location: `$TFWORKSPACE_CONFIG`, else `tfworkspace.toml`
/// in the current working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("TFWORKSPACE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tfworkspace.toml"))
}
