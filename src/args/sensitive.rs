//! Sensitive values and redaction
//!
//! [`Sensitive`] wraps a value so that every textual form of it (Display,
//! Debug, Serialize) is the fixed [`REDACTED`] token. [`Redactor`] is the
//! second line: it knows the raw secret strings of one invocation and scrubs
//! them out of anything that is about to leave the process.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Replacement token for sensitive values.
pub const REDACTED: &str = "VALUE_SPECIFIED_IN_NO_LOG_PARAMETER";

/// Mapping keys whose values are treated as secrets even inside
/// non-sensitive parameters (e.g. an inline `cloud` mapping).
const SECRET_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "private_key",
    "client_key",
    "key",
    "sk",
    "security_token",
];

/// A value that must never be formatted.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the raw value. Callers must not log or format it.
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> Serialize for Sensitive<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sensitive<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Sensitive)
    }
}

impl From<String> for Sensitive<String> {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Scrubs known secret strings out of outgoing text and JSON.
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl fmt::Debug for Redactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every string leaf of a sensitive value.
    pub fn add_value(&mut self, value: &Value) {
        match value {
            Value::String(s) => self.add(s),
            Value::Array(items) => items.iter().for_each(|v| self.add_value(v)),
            Value::Object(map) => map.values().for_each(|v| self.add_value(v)),
            Value::Number(n) => self.add(&n.to_string()),
            Value::Null | Value::Bool(_) => {}
        }
    }

    /// Register the values of secret-looking keys inside an otherwise
    /// non-sensitive mapping.
    pub fn add_secret_fields(&mut self, value: &Value) {
        match value {
            Value::Object(map) => {
                for (key, v) in map {
                    if is_secret_key(key) {
                        self.add_value(v);
                    } else {
                        self.add_secret_fields(v);
                    }
                }
            }
            Value::Array(items) => items.iter().for_each(|v| self.add_secret_fields(v)),
            _ => {}
        }
    }

    pub fn add(&mut self, secret: &str) {
        if secret.is_empty() || secret == REDACTED || self.secrets.iter().any(|s| s == secret) {
            return;
        }
        self.secrets.push(secret.to_string());
        // Longest first so that a secret containing another is fully masked.
        self.secrets.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    /// Take over every secret another redactor knows
    pub fn merge(&mut self, other: &Redactor) {
        for secret in &other.secrets {
            self.add(secret);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn scrub_str(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }

    /// Scrub every string (values and keys) in a JSON document in place.
    pub fn scrub_value(&self, value: &mut Value) {
        if self.secrets.is_empty() {
            return;
        }
        match value {
            Value::String(s) => {
                if self.secrets.iter().any(|secret| s.contains(secret.as_str())) {
                    *s = self.scrub_str(s);
                }
            }
            Value::Number(n) => {
                let text = n.to_string();
                if self.secrets.iter().any(|secret| *secret == text) {
                    *value = Value::String(REDACTED.to_string());
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.scrub_value(v)),
            Value::Object(map) => {
                let entries = std::mem::take(map);
                for (key, mut v) in entries {
                    self.scrub_value(&mut v);
                    map.insert(self.scrub_str(&key), v);
                }
            }
            Value::Null | Value::Bool(_) => {}
        }
    }
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_KEYS.contains(&key.as_str()) || key.ends_with("_password") || key.ends_with("_secret")
}
