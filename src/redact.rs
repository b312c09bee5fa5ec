// src/redact.rs

//! Output redaction.
//!
//! A workspace is bound to one [`OutputFilter`] when it is created. Every
//! piece of captured terraform output passes through it before being logged
//! or returned inside an error.

use std::fmt;

use serde_json::Value;

use crate::types::ProviderConfiguration;

/// Marker substituted for sensitive values.
pub const REDACTED: &str = "REDACTED";

/// Strategy applied to captured command output.
pub trait OutputFilter: Send + Sync {
    fn filter(&self, output: &str) -> String;
}

impl<F> OutputFilter for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn filter(&self, output: &str) -> String {
        self(output)
    }
}

/// Replaces every string value of a provider configuration with
/// [`REDACTED`].
#[derive(Clone, Default)]
pub struct ConfigurationRedactor {
    // Longest first, so a secret that contains another is replaced whole.
    secrets: Vec<String>,
}

impl fmt::Debug for ConfigurationRedactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationRedactor")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

impl ConfigurationRedactor {
    pub fn from_configuration(cfg: &ProviderConfiguration) -> Self {
        let mut secrets = Vec::new();
        for value in cfg.values() {
            collect_strings(value, &mut secrets);
        }
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self { secrets }
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.is_empty() => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

impl OutputFilter for ConfigurationRedactor {
    fn filter(&self, output: &str) -> String {
        let mut s = output.to_string();
        for secret in &self.secrets {
            if s.contains(secret.as_str()) {
                s = s.replace(secret.as_str(), REDACTED);
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg(pairs: &[(&str, Value)]) -> ProviderConfiguration {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn replaces_string_values() {
        let r = ConfigurationRedactor::from_configuration(&cfg(&[
            ("access_key", json!("AKIAEXAMPLE")),
            ("secret_key", json!("s3cr3t")),
        ]));
        let out = r.filter("Error: invalid key AKIAEXAMPLE with secret s3cr3t");
        assert_eq!(out, "Error: invalid key REDACTED with secret REDACTED");
    }

    #[test]
    fn ignores_empty_and_non_string_values() {
        let r = ConfigurationRedactor::from_configuration(&cfg(&[
            ("empty", json!("")),
            ("port", json!(5432)),
            ("enabled", json!(true)),
        ]));
        assert_eq!(r.filter("port 5432 enabled true"), "port 5432 enabled true");
    }

    #[test]
    fn nested_strings_are_redacted() {
        let r = ConfigurationRedactor::from_configuration(&cfg(&[(
            "assume_role",
            json!({ "role_arn": "arn:aws:iam::123:role/x", "tags": ["t0ken"] }),
        )]));
        let out = r.filter("using arn:aws:iam::123:role/x and t0ken");
        assert!(!out.contains("arn:aws:iam::123:role/x"));
        assert!(!out.contains("t0ken"));
    }

    #[test]
    fn longer_secret_wins_over_its_prefix() {
        let r = ConfigurationRedactor::from_configuration(&cfg(&[
            ("a", json!("abc")),
            ("b", json!("abcdef")),
        ]));
        assert_eq!(r.filter("x abcdef y"), "x REDACTED y");
    }

    #[test]
    fn closures_are_filters() {
        let f = |s: &str| s.to_uppercase();
        assert_eq!(OutputFilter::filter(&f, "abc"), "ABC");
    }
}
