//! Harness
//!
//! Runs one module invocation end to end: payload, schema, validation,
//! preflight, session, run hook, envelope. Every path ends in exactly one
//! [`Envelope`].

use serde_json::{Map, Value};
use std::io::Write;
use std::time::Duration;

use super::{Module, ModuleContext};
use crate::args::{ArgumentSpec, Params, Redactor};
use crate::envelope::{Envelope, OutcomeChannel};
use crate::error::{ModuleError, Result};
use crate::otc::session::{preflight, Connector, SDK_VERSION};
use crate::reconcile::wait::{WaitPolicy, DEFAULT_POLL_INTERVAL};

/// Key wrapping module arguments in runner payloads
const ARGS_WRAPPER: &str = "ANSIBLE_MODULE_ARGS";

/// Prefix of runner-internal options mixed into the arguments
const INTERNAL_PREFIX: &str = "_ansible_";

/// Parsed runner payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub args: Map<String, Value>,
    pub check_mode: bool,
    pub diff: bool,
}

impl Invocation {
    /// Accepts either the bare argument mapping or one wrapped in
    /// `ANSIBLE_MODULE_ARGS`. Runner-internal `_ansible_*` keys are taken
    /// out of the arguments.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let args = match payload.get(ARGS_WRAPPER) {
            Some(inner) => inner,
            None => payload,
        };
        let Value::Object(args) = args else {
            return Err(ModuleError::invalid("module arguments must be a JSON mapping"));
        };

        let mut invocation = Invocation::default();
        for (key, value) in args {
            match key.strip_prefix(INTERNAL_PREFIX) {
                Some("check_mode") => invocation.check_mode = truthy(value),
                Some("diff") => invocation.diff = truthy(value),
                Some(other) => tracing::debug!("Ignoring runner option _ansible_{}", other),
                None => {
                    invocation.args.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(invocation)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "yes" | "true" | "1" | "on"),
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

/// Secrets present in raw arguments, before validation has wrapped them
fn raw_redactor(spec: &ArgumentSpec, args: &Map<String, Value>) -> Redactor {
    let mut redactor = Redactor::new();
    for (key, value) in args {
        let sensitive = spec
            .canonical_name(key)
            .and_then(|name| spec.get(name))
            .is_some_and(|s| s.sensitive);
        if sensitive {
            redactor.add_value(value);
        } else {
            redactor.add_secret_fields(value);
        }
    }
    redactor
}

pub struct Harness<C: Connector> {
    connector: C,
    sdk_version: String,
    poll_interval: Duration,
}

impl<C: Connector> Harness<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            sdk_version: SDK_VERSION.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_sdk_version(mut self, version: &str) -> Self {
        self.sdk_version = version.to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run `module` on a runner payload and build its envelope
    pub async fn invoke(&self, module: &dyn Module, payload: &Value) -> Envelope {
        let invocation = match Invocation::from_payload(payload) {
            Ok(invocation) => invocation,
            Err(e) => return Envelope::fail(&e),
        };
        self.run(module, invocation).await
    }

    /// Run and write the envelope to `channel`
    pub async fn invoke_to<W: Write>(
        &self,
        module: &dyn Module,
        payload: &Value,
        channel: &mut OutcomeChannel<W>,
    ) -> Result<Envelope> {
        let envelope = self.invoke(module, payload).await;
        channel.emit(&envelope)?;
        Ok(envelope)
    }

    pub async fn run(&self, module: &dyn Module, invocation: Invocation) -> Envelope {
        let spec = ArgumentSpec::common().extend(module.argument_spec());
        let mut redactor = raw_redactor(&spec, &invocation.args);

        tracing::info!(
            "Running module {}{}",
            module.name(),
            if invocation.check_mode { " in check mode" } else { "" }
        );

        let params = match spec.validate(&invocation.args) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!("{}", redactor.scrub_str(&e.to_string()));
                let mut envelope = Envelope::fail(&e);
                envelope.redact(&redactor);
                return envelope;
            }
        };
        tracing::debug!("module_args: {}", params.redacted());

        redactor.merge(&params.redactor());

        let result = self.execute(module, &spec, &params, &invocation).await;
        let envelope = match result {
            Ok(outcome) => Envelope::exit(outcome),
            Err(e) => {
                tracing::error!("{} failed: {}", module.name(), redactor.scrub_str(&e.to_string()));
                Envelope::fail(&e)
            }
        };

        let mut envelope = envelope.with_invocation(params.redacted());
        envelope.redact(&redactor);
        envelope
    }

    async fn execute(
        &self,
        module: &dyn Module,
        spec: &ArgumentSpec,
        params: &Params,
        invocation: &Invocation,
    ) -> Result<crate::envelope::Outcome> {
        preflight(spec, params, module.min_sdk_version(), &self.sdk_version)?;

        let session = self.connector.connect(params).await?;

        let ctx = ModuleContext {
            params: params.clone(),
            session,
            check_mode: invocation.check_mode,
            diff: invocation.diff,
            wait: WaitPolicy::from_params(params, self.poll_interval),
        };

        module.run(&ctx).await
    }
}
