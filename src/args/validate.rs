//! Argument validation
//!
//! Order of checks: unknown keys and alias conflicts, mutually exclusive,
//! required one of, required together, required, required if, types,
//! choices. Defaults are applied only after everything passed.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::params::{ParamValue, Params};
use super::sensitive::Sensitive;
use super::spec::{ArgumentSpec, Kind};
use crate::error::{ModuleError, Result};

const TRUTHY: &[&str] = &["yes", "on", "1", "true", "y", "t"];
const FALSY: &[&str] = &["no", "off", "0", "false", "n", "f"];

impl ArgumentSpec {
    /// Validate raw module arguments into [`Params`].
    pub fn validate(&self, args: &Map<String, Value>) -> Result<Params> {
        let supplied = self.resolve_aliases(args)?;
        let present = |name: &str| supplied.get(name).is_some_and(|v| !v.is_null());

        for group in &self.mutually_exclusive {
            let hits: Vec<&str> = group.iter().map(String::as_str).filter(|n| present(*n)).collect();
            if hits.len() > 1 {
                return Err(ModuleError::invalid(format!(
                    "parameters are mutually exclusive: {}",
                    group.join("|")
                )));
            }
        }

        for group in &self.required_one_of {
            if !group.iter().any(|n| present(n.as_str())) {
                return Err(ModuleError::invalid(format!(
                    "one of the following is required: {}",
                    group.join(", ")
                )));
            }
        }

        for group in &self.required_together {
            let count = group.iter().filter(|n| present(n.as_str())).count();
            if count > 0 && count < group.len() {
                return Err(ModuleError::invalid(format!(
                    "parameters are required together: {}",
                    group.join(", ")
                )));
            }
        }

        let missing: Vec<&str> = self
            .params
            .iter()
            .filter(|(name, spec)| spec.required && !present(name.as_str()))
            .map(|(name, _)| name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ModuleError::invalid(format!(
                "missing required arguments: {}",
                missing.join(", ")
            )));
        }

        for clause in &self.required_if {
            if !self.clause_triggered(&clause.key, &clause.value, &supplied) {
                continue;
            }
            let absent: Vec<&str> = clause
                .requirements
                .iter()
                .map(String::as_str)
                .filter(|n| !present(*n))
                .collect();
            let unsatisfied = if clause.any {
                absent.len() == clause.requirements.len()
            } else {
                !absent.is_empty()
            };
            if unsatisfied {
                let quantifier = if clause.any { "any" } else { "all" };
                return Err(ModuleError::invalid(format!(
                    "{} is {} but {} of the following are missing: {}",
                    clause.key,
                    display_value(&clause.value),
                    quantifier,
                    absent.join(", ")
                )));
            }
        }

        let mut params = Params::default();
        for (name, spec) in &self.params {
            let (value, explicit) = match supplied.get(name) {
                Some(Value::Null) => (Value::Null, true),
                Some(raw) => {
                    let value = coerce(&spec.kind, raw).map_err(|reason| {
                        // The raw value is not echoed for sensitive parameters.
                        let got = if spec.sensitive { String::new() } else { format!(" ({})", reason) };
                        ModuleError::invalid(format!(
                            "argument '{}' is not a valid {}{}",
                            name,
                            spec.kind.name(),
                            got
                        ))
                    })?;
                    check_choices(name, &spec.choices, &value, spec.sensitive)?;
                    (value, true)
                }
                None => (spec.default_value(), false),
            };

            let value = if spec.sensitive {
                ParamValue::Secret(Sensitive::new(value))
            } else {
                ParamValue::Plain(value)
            };
            params.insert(name.clone(), value, explicit);
        }

        Ok(params)
    }

    /// Map supplied keys to canonical names, rejecting unknown keys and
    /// conflicting alias forms.
    fn resolve_aliases(&self, args: &Map<String, Value>) -> Result<BTreeMap<String, Value>> {
        let mut supplied: BTreeMap<String, Value> = BTreeMap::new();
        let mut via: BTreeMap<String, String> = BTreeMap::new();
        let mut unknown: Vec<&str> = Vec::new();

        for (key, value) in args {
            let Some(canonical) = self.canonical_name(key) else {
                unknown.push(key);
                continue;
            };
            if let Some(previous) = supplied.get(canonical) {
                if previous != value {
                    let first = via.get(canonical).map(String::as_str).unwrap_or(canonical);
                    return Err(ModuleError::invalid(format!(
                        "parameters '{}' and '{}' are aliases of '{}' and were given different values",
                        first, key, canonical
                    )));
                }
                continue;
            }
            supplied.insert(canonical.to_string(), value.clone());
            via.insert(canonical.to_string(), key.clone());
        }

        if !unknown.is_empty() {
            let supported: Vec<&str> = self.params.keys().map(String::as_str).collect();
            return Err(ModuleError::invalid(format!(
                "unsupported parameters: {}. Supported parameters include: {}",
                unknown.join(", "),
                supported.join(", ")
            )));
        }

        Ok(supplied)
    }

    fn clause_triggered(&self, key: &str, expected: &Value, supplied: &BTreeMap<String, Value>) -> bool {
        let Some(spec) = self.params.get(key) else {
            return false;
        };
        let actual = match supplied.get(key) {
            Some(raw) => coerce(&spec.kind, raw).unwrap_or(Value::Null),
            None => spec.default_value(),
        };
        loosely_equal(&actual, expected)
    }
}

/// Convert a supplied value to the declared kind.
pub fn coerce(kind: &Kind, raw: &Value) -> std::result::Result<Value, String> {
    match kind {
        Kind::Raw => Ok(raw.clone()),
        Kind::Str => match raw {
            Value::String(_) => Ok(raw.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(format!("got {}", type_name(other))),
        },
        Kind::Int => match raw {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(i))
                } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0) {
                    // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive.
                    if f >= -(2f64.powi(63)) && f < 2f64.powi(63) {
                        Ok(Value::from(f as i64))
                    } else {
                        Err("got an integer out of range".to_string())
                    }
                } else {
                    Err("got a non-integral number".to_string())
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| "got text that is not a decimal integer".to_string()),
            other => Err(format!("got {}", type_name(other))),
        },
        Kind::Bool => match raw {
            Value::Bool(_) => Ok(raw.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(1) => Ok(Value::Bool(true)),
                Some(0) => Ok(Value::Bool(false)),
                _ => Err("got a number other than 0 or 1".to_string()),
            },
            Value::String(s) => {
                let lowered = s.trim().to_ascii_lowercase();
                if TRUTHY.contains(&lowered.as_str()) {
                    Ok(Value::Bool(true))
                } else if FALSY.contains(&lowered.as_str()) {
                    Ok(Value::Bool(false))
                } else {
                    Err("got text that is not a boolean".to_string())
                }
            }
            other => Err(format!("got {}", type_name(other))),
        },
        Kind::List(inner) => {
            let items: Vec<Value> = match raw {
                Value::Array(items) => items.clone(),
                Value::String(s) if s.trim().is_empty() => Vec::new(),
                Value::String(s) => s.split(',').map(|p| Value::String(p.trim().to_string())).collect(),
                Value::Number(_) | Value::Bool(_) => vec![raw.clone()],
                other => return Err(format!("got {}", type_name(other))),
            };
            items
                .iter()
                .map(|item| coerce(inner, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        Kind::Dict => match raw {
            Value::Object(_) => Ok(raw.clone()),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v @ Value::Object(_)) => Ok(v),
                _ => Err("got text that is not a JSON object".to_string()),
            },
            other => Err(format!("got {}", type_name(other))),
        },
    }
}

fn check_choices(name: &str, choices: &[Value], value: &Value, sensitive: bool) -> Result<()> {
    if choices.is_empty() {
        return Ok(());
    }
    let candidates: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    if let Some(bad) = candidates.into_iter().find(|v| !choices.iter().any(|c| loosely_equal(v, c))) {
        let accepted: Vec<String> = choices.iter().map(display_value).collect();
        let got = if sensitive { String::new() } else { format!(", got: {}", display_value(bad)) };
        return Err(ModuleError::invalid(format!(
            "value of {} must be one of: {}{}",
            name,
            accepted.join(", "),
            got
        )));
    }
    Ok(())
}

/// Equality that treats numbers by value.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
