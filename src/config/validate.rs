// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ProviderConfig, RawStoreConfig, StoreConfig};
use crate::errors::{Result, WorkspaceError};

impl TryFrom<RawStoreConfig> for StoreConfig {
    type Error = WorkspaceError;

    fn try_from(raw: RawStoreConfig) -> std::result::Result<Self, Self::Error> {
        validate_root_dir(&raw)?;
        validate_binary("[terraform].binary", &raw.terraform.binary)?;

        let kill_grace_period = parse_duration(&raw.kill_grace_period)
            .map_err(|e| WorkspaceError::ConfigError(format!("kill_grace_period: {e}")))?;

        let provider = match raw.provider {
            Some(p) => {
                validate_binary("[provider].binary", &p.binary)?;
                let start_timeout = parse_duration(&p.start_timeout).map_err(|e| {
                    WorkspaceError::ConfigError(format!("[provider].start_timeout: {e}"))
                })?;
                if start_timeout.is_zero() {
                    return Err(WorkspaceError::ConfigError(
                        "[provider].start_timeout must be greater than zero".to_string(),
                    ));
                }
                Some(ProviderConfig {
                    binary: p.binary,
                    args: p.args,
                    start_timeout,
                })
            }
            None => None,
        };

        Ok(StoreConfig {
            root_dir: raw.root_dir,
            kill_grace_period,
            terraform_binary: raw.terraform.binary,
            plugin_cache_dir: raw.terraform.plugin_cache_dir,
            provider,
        })
    }
}

fn validate_root_dir(cfg: &RawStoreConfig) -> Result<()> {
    if let Some(dir) = &cfg.root_dir {
        if !dir.is_absolute() {
            return Err(WorkspaceError::ConfigError(format!(
                "root_dir must be an absolute path (got {:?})",
                dir
            )));
        }
    }
    Ok(())
}

fn validate_binary(field: &str, binary: &str) -> Result<()> {
    if binary.trim().is_empty() {
        return Err(WorkspaceError::ConfigError(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(value, 60),
        "h" => secs(value, 60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn secs(value: u64, unit: u64) -> std::result::Result<Duration, String> {
    value
        .checked_mul(unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{value}' is too large"))
}
