//! Key-based redaction and secret leakage detection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use toolflow_core::sanitize::Sanitizer;
use tracing::debug;

/// Replacement written over every redacted value.
pub const REDACTED: &str = "[REDACTED]";

const DEFAULT_KEYS: &[&str] = &["password", "api_key", "token", "secret", "authorization"];

/// Recursively replaces the values of sensitive object keys.
///
/// Key matching is case-insensitive and by substring, so `"X-Api-Key"`,
/// `"access_token"` and `"client_secret"` are all caught by the defaults.
/// Hyphens are treated as underscores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRedactor {
    keys: Vec<String>,
}

impl Default for KeyRedactor {
    fn default() -> Self {
        Self {
            keys: DEFAULT_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl KeyRedactor {
    /// Redact only the given keys.
    pub fn with_keys(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keys: keys.into_iter().map(|k| normalize(&k.into())).collect(),
        }
    }

    /// Add a key on top of the current set.
    pub fn add_key(mut self, key: impl Into<String>) -> Self {
        self.keys.push(normalize(&key.into()));
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = normalize(key);
        self.keys.iter().any(|k| key.contains(k.as_str()))
    }

    fn redact(&self, value: &Value, redacted: &mut usize) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    if self.is_sensitive(k) && !v.is_null() {
                        *redacted += 1;
                        out.insert(k.clone(), Value::String(REDACTED.into()));
                    } else {
                        out.insert(k.clone(), self.redact(v, redacted));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.redact(v, redacted)).collect())
            }
            other => other.clone(),
        }
    }
}

impl Sanitizer for KeyRedactor {
    fn sanitize(&self, value: &Value) -> Value {
        let mut redacted = 0;
        let out = self.redact(value, &mut redacted);
        if redacted > 0 {
            debug!(redacted, "Redacted sensitive parameters");
        }
        out
    }
}

fn normalize(key: &str) -> String {
    key.to_lowercase().replace('-', "_")
}

/// Whether `output` contains any of the known `secrets`.
pub fn scan_for_leakage(output: &str, secrets: &[String]) -> bool {
    secrets.iter().any(|s| !s.is_empty() && output.contains(s.as_str()))
}

/// Replace every occurrence of a known secret in `text`.
pub fn mask_secrets(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, s| acc.replace(s.as_str(), REDACTED))
}
