//! Validated invocation parameters

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::sensitive::{Redactor, Sensitive, REDACTED};

/// A resolved parameter value. Sensitive parameters are wrapped.
#[derive(Clone, PartialEq)]
pub enum ParamValue {
    Plain(Value),
    Secret(Sensitive<Value>),
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        match self {
            ParamValue::Plain(v) => v.is_null(),
            ParamValue::Secret(s) => s.expose().is_null(),
        }
    }

    /// Value as it may appear in logs and the envelope.
    pub fn redacted(&self) -> Value {
        match self {
            ParamValue::Plain(v) => v.clone(),
            ParamValue::Secret(s) if s.expose().is_null() => Value::Null,
            ParamValue::Secret(_) => Value::String(REDACTED.to_string()),
        }
    }
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Plain(v) => write!(f, "{}", v),
            ParamValue::Secret(s) => write!(f, "{}", s),
        }
    }
}

/// Parameters after validation: one value per declared name, plus the set
/// of names the caller supplied explicitly.
#[derive(Clone, Default)]
pub struct Params {
    values: BTreeMap<String, ParamValue>,
    explicit: BTreeSet<String>,
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl Params {
    pub(crate) fn insert(&mut self, name: String, value: ParamValue, explicit: bool) {
        if explicit {
            self.explicit.insert(name.clone());
        }
        self.values.insert(name, value);
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Non-null plain value. Sensitive parameters are never returned here;
    /// use [`Params::secret`].
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.values.get(name)? {
            ParamValue::Plain(v) if !v.is_null() => Some(v),
            _ => None,
        }
    }

    /// Non-null sensitive value, still wrapped.
    pub fn secret(&self, name: &str) -> Option<&Sensitive<Value>> {
        match self.values.get(name)? {
            ParamValue::Secret(s) if !s.expose().is_null() => Some(s),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn get_map(&self, name: &str) -> Option<&Map<String, Value>> {
        self.get(name).and_then(Value::as_object)
    }

    pub fn get_str_list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the caller supplied this parameter (including explicit null).
    pub fn is_explicit(&self, name: &str) -> bool {
        self.explicit.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Redacted JSON view for logs and `invocation.module_args`. Secret
    /// fields nested in mapping parameters are masked too.
    pub fn redacted(&self) -> Value {
        let mut view = Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.redacted()))
                .collect(),
        );
        self.redactor().scrub_value(&mut view);
        view
    }

    /// Redactor primed with every secret this invocation carries: all
    /// sensitive parameters, plus secret-looking fields of mapping
    /// parameters such as an inline `cloud`.
    pub fn redactor(&self) -> Redactor {
        let mut redactor = Redactor::new();
        for value in self.values.values() {
            match value {
                ParamValue::Secret(s) => redactor.add_value(s.expose()),
                ParamValue::Plain(v) => redactor.add_secret_fields(v),
            }
        }
        redactor
    }
}
