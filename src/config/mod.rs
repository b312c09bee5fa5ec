// src/config/mod.rs

//! Store configuration: TOML model, loading and validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ProviderConfig, ProviderSection, RawStoreConfig, StoreConfig, TerraformSection};
pub use validate::parse_duration;
