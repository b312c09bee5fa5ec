// tests/redaction_property.rs

use proptest::prelude::*;
use serde_json::{json, Value};
use tfworkspace::redact::{ConfigurationRedactor, OutputFilter};
use tfworkspace::types::ProviderConfiguration;

// Secrets are lowercase so they can never overlap the uppercase marker.
fn secret() -> impl Strategy<Value = String> {
    "[a-z0-9]{4,12}"
}

fn configuration(secrets: &[String]) -> ProviderConfiguration {
    let mut cfg = ProviderConfiguration::new();
    for (i, s) in secrets.iter().enumerate() {
        // Alternate top-level, nested object and array placement.
        let value = match i % 3 {
            0 => Value::String(s.clone()),
            1 => json!({ "inner": { "value": s } }),
            _ => json!([1, s, false]),
        };
        cfg.insert(format!("key{i}"), value);
    }
    cfg
}

proptest! {
    #[test]
    fn no_configuration_string_survives_redaction(
        secrets in proptest::collection::vec(secret(), 1..6),
        fillers in proptest::collection::vec("[a-z :\n]{0,16}", 1..8),
    ) {
        let redactor = ConfigurationRedactor::from_configuration(&configuration(&secrets));

        let mut output = String::new();
        for (i, filler) in fillers.iter().enumerate() {
            output.push_str(filler);
            output.push_str(&secrets[i % secrets.len()]);
        }

        let filtered = redactor.filter(&output);
        for s in &secrets {
            prop_assert!(!filtered.contains(s.as_str()), "{s} leaked into {filtered}");
        }
        prop_assert!(filtered.contains("REDACTED"));
    }

    #[test]
    fn text_without_secrets_is_untouched(text in "[A-Z ]{0,40}") {
        let redactor = ConfigurationRedactor::from_configuration(&configuration(&["hunter2".to_string()]));
        prop_assert_eq!(redactor.filter(&text), text);
    }
}
