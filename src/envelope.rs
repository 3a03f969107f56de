//! Result envelope
//!
//! Modules return an [`Outcome`]; the harness turns it (or the error) into
//! an [`Envelope`] and writes it through an [`OutcomeChannel`], which
//! refuses a second write.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::io::Write;

use crate::args::Redactor;
use crate::error::{ModuleError, Result};

/// Keys owned by the envelope itself; module data may not use them
const RESERVED_KEYS: &[&str] = &["changed", "failed", "msg", "diff", "warnings", "invocation"];

/// What a module's run hook returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub changed: bool,
    pub data: Map<String, Value>,
    pub diff: Option<Value>,
    pub warnings: Vec<String>,
}

impl Outcome {
    pub fn new(changed: bool) -> Self {
        Self {
            changed,
            ..Self::default()
        }
    }

    pub fn unchanged() -> Self {
        Self::new(false)
    }

    /// Attach a resource representation under `key`
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn with_diff(mut self, diff: Value) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn warn(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// The single structured outcome of an invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub changed: bool,
    pub failed: bool,
    pub msg: Option<String>,
    pub data: Map<String, Value>,
    pub diff: Option<Value>,
    pub warnings: Vec<String>,
    /// Redacted `module_args` echo
    pub invocation: Option<Value>,
}

impl Envelope {
    /// Success envelope from a module outcome
    pub fn exit(outcome: Outcome) -> Self {
        let mut data = outcome.data;
        let mut warnings = outcome.warnings;
        for key in RESERVED_KEYS {
            if data.remove(*key).is_some() {
                warnings.push(format!("module data key '{}' is reserved and was dropped", key));
            }
        }
        Self {
            changed: outcome.changed,
            failed: false,
            msg: None,
            data,
            diff: outcome.diff,
            warnings,
            invocation: None,
        }
    }

    /// Failure envelope; `msg` is the taxon-prefixed error text
    pub fn fail(error: &ModuleError) -> Self {
        Self {
            changed: false,
            failed: true,
            msg: Some(error.to_string()),
            data: Map::new(),
            diff: None,
            warnings: Vec::new(),
            invocation: None,
        }
    }

    pub fn with_invocation(mut self, module_args: Value) -> Self {
        self.invocation = Some(serde_json::json!({ "module_args": module_args }));
        self
    }

    /// Mask every known secret in every textual part of the envelope
    pub fn redact(&mut self, redactor: &Redactor) {
        if redactor.is_empty() {
            return;
        }
        if let Some(msg) = &self.msg {
            self.msg = Some(redactor.scrub_str(msg));
        }
        for value in self.data.values_mut() {
            redactor.scrub_value(value);
        }
        if let Some(diff) = &mut self.diff {
            redactor.scrub_value(diff);
        }
        if let Some(invocation) = &mut self.invocation {
            redactor.scrub_value(invocation);
        }
        self.warnings = self.warnings.iter().map(|w| redactor.scrub_str(w)).collect();
    }

    /// Exit status for the process
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failed)
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.data.clone();
        map.insert("changed".to_string(), Value::Bool(self.changed));
        map.insert("failed".to_string(), Value::Bool(self.failed));
        if let Some(msg) = &self.msg {
            map.insert("msg".to_string(), Value::String(msg.clone()));
        }
        if let Some(diff) = &self.diff {
            map.insert("diff".to_string(), diff.clone());
        }
        if !self.warnings.is_empty() {
            map.insert(
                "warnings".to_string(),
                Value::Array(self.warnings.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(invocation) = &self.invocation {
            map.insert("invocation".to_string(), invocation.clone());
        }
        Value::Object(map)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Write-once sink for the envelope
pub struct OutcomeChannel<W: Write> {
    writer: W,
    written: bool,
}

impl<W: Write> OutcomeChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: false,
        }
    }

    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Serialize the envelope as one JSON line. A second call is a harness
    /// bug and fails without writing.
    pub fn emit(&mut self, envelope: &Envelope) -> Result<()> {
        if self.written {
            return Err(ModuleError::internal("envelope already written for this invocation"));
        }
        self.written = true;

        serde_json::to_writer(&mut self.writer, envelope)
            .map_err(|e| ModuleError::internal(format!("failed to serialize envelope: {}", e)))?;
        self.writer
            .write_all(b"\n")
            .and_then(|_| self.writer.flush())
            .map_err(|e| ModuleError::internal(format!("failed to write envelope: {}", e)))
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
