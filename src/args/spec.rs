//! Declarative argument descriptors
//!
//! An [`ArgumentSpec`] is a table of [`ArgSpec`] descriptors plus the
//! cross-parameter matrix. Every module composes [`ArgumentSpec::common`]
//! with its own extension.

use serde_json::Value;
use std::collections::BTreeMap;

/// Declared kind of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Str,
    Int,
    Bool,
    /// List whose elements are coerced to the inner kind.
    List(Box<Kind>),
    Dict,
    /// Passed through untouched.
    Raw,
}

impl Kind {
    pub fn list_of(inner: Kind) -> Self {
        Kind::List(Box::new(inner))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kind::Str => "str",
            Kind::Int => "int",
            Kind::Bool => "bool",
            Kind::List(_) => "list",
            Kind::Dict => "dict",
            Kind::Raw => "raw",
        }
    }
}

/// Descriptor of a single parameter.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub kind: Kind,
    pub required: bool,
    pub default: Option<Value>,
    pub choices: Vec<Value>,
    pub aliases: Vec<&'static str>,
    /// Value must never appear in logs, messages or the envelope.
    pub sensitive: bool,
}

impl ArgSpec {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            choices: Vec::new(),
            aliases: Vec::new(),
            sensitive: false,
        }
    }

    pub fn str() -> Self {
        Self::new(Kind::Str)
    }

    pub fn int() -> Self {
        Self::new(Kind::Int)
    }

    pub fn bool() -> Self {
        Self::new(Kind::Bool)
    }

    pub fn list(elements: Kind) -> Self {
        Self::new(Kind::list_of(elements))
    }

    pub fn dict() -> Self {
        Self::new(Kind::Dict)
    }

    pub fn raw() -> Self {
        Self::new(Kind::Raw)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Default value as the validator sees it (absent default is null).
    pub fn default_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }
}

/// `required_if` clause: when `key == value`, `requirements` must be
/// present (all of them, or at least one when `any` is set).
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredIf {
    pub key: String,
    pub value: Value,
    pub requirements: Vec<String>,
    pub any: bool,
}

/// Parameter table plus cross-parameter matrix.
#[derive(Debug, Clone, Default)]
pub struct ArgumentSpec {
    pub params: BTreeMap<String, ArgSpec>,
    pub mutually_exclusive: Vec<Vec<String>>,
    pub required_together: Vec<Vec<String>>,
    pub required_one_of: Vec<Vec<String>>,
    pub required_if: Vec<RequiredIf>,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl ArgumentSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments shared by every module: cloud selection, auth, TLS, and
    /// the wait/timeout pair.
    pub fn common() -> Self {
        Self::new()
            .param("cloud", ArgSpec::raw())
            .param("auth_type", ArgSpec::str())
            .param("auth", ArgSpec::dict().sensitive())
            .param("region_name", ArgSpec::str())
            .param(
                "interface",
                ArgSpec::str()
                    .choices(["public", "internal", "admin"])
                    .default("public")
                    .alias("endpoint_type"),
            )
            .param("validate_certs", ArgSpec::bool().alias("verify"))
            .param("ca_cert", ArgSpec::str().alias("cacert"))
            .param("client_cert", ArgSpec::str().alias("cert"))
            .param("client_key", ArgSpec::str().sensitive().alias("key"))
            .param("api_timeout", ArgSpec::int())
            .param("timeout", ArgSpec::int().default(180))
            .param("wait", ArgSpec::bool().default(true))
    }

    pub fn param(mut self, name: &str, spec: ArgSpec) -> Self {
        self.params.insert(name.to_string(), spec);
        self
    }

    pub fn mutually_exclusive(mut self, names: &[&str]) -> Self {
        self.mutually_exclusive.push(owned(names));
        self
    }

    pub fn required_together(mut self, names: &[&str]) -> Self {
        self.required_together.push(owned(names));
        self
    }

    pub fn required_one_of(mut self, names: &[&str]) -> Self {
        self.required_one_of.push(owned(names));
        self
    }

    pub fn required_if(mut self, key: &str, value: impl Into<Value>, requirements: &[&str]) -> Self {
        self.required_if.push(RequiredIf {
            key: key.to_string(),
            value: value.into(),
            requirements: owned(requirements),
            any: false,
        });
        self
    }

    pub fn required_if_any(
        mut self,
        key: &str,
        value: impl Into<Value>,
        requirements: &[&str],
    ) -> Self {
        self.required_if.push(RequiredIf {
            key: key.to_string(),
            value: value.into(),
            requirements: owned(requirements),
            any: true,
        });
        self
    }

    /// Shallow merge; on a name collision the extension's descriptor wins.
    /// Matrices are concatenated.
    pub fn extend(mut self, extension: ArgumentSpec) -> Self {
        self.params.extend(extension.params);
        self.mutually_exclusive.extend(extension.mutually_exclusive);
        self.required_together.extend(extension.required_together);
        self.required_one_of.extend(extension.required_one_of);
        self.required_if.extend(extension.required_if);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArgSpec> {
        self.params.get(name)
    }

    /// Resolve a supplied key to its canonical parameter name.
    pub fn canonical_name(&self, key: &str) -> Option<&str> {
        if let Some((name, _)) = self.params.get_key_value(key) {
            return Some(name.as_str());
        }
        self.params
            .iter()
            .find(|(_, spec)| spec.aliases.contains(&key))
            .map(|(name, _)| name.as_str())
    }

    /// Names of the parameters marked sensitive.
    pub fn sensitive_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(_, spec)| spec.sensitive)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
