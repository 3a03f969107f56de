//! Module contract
//!
//! A module declares its argument extension and, optionally, the minimum
//! harness version it needs; its run hook receives a [`ModuleContext`] and
//! returns an [`Outcome`]. It never writes the envelope itself.
//!
//! # Module Structure
//!
//! - [`registry`] - lookup of shipped modules by name
//! - [`runner`] - the [`Harness`] driving one invocation
//! - [`query`] - helpers for `_info` modules

pub mod query;
pub mod registry;
pub mod runner;

use async_trait::async_trait;
use serde_json::Value;

use crate::args::{ArgSpec, ArgumentSpec, Params};
use crate::envelope::Outcome;
use crate::error::Result;
use crate::reconcile::{DesiredState, Reconciler, ResourceAdapter, WaitPolicy};
use crate::services::Session;

pub use registry::{find_module, module_names};
pub use runner::{Harness, Invocation};

#[async_trait]
pub trait Module: Send + Sync {
    /// Name the module is invoked as
    fn name(&self) -> &'static str;

    /// Module-specific arguments, merged over [`ArgumentSpec::common`]
    fn argument_spec(&self) -> ArgumentSpec;

    fn min_sdk_version(&self) -> Option<&'static str> {
        None
    }

    async fn run(&self, ctx: &ModuleContext) -> Result<Outcome>;
}

/// Everything a run hook may use
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub params: Params,
    pub session: Session,
    pub check_mode: bool,
    /// Whether the runner asked for `diff` output
    pub diff: bool,
    pub wait: WaitPolicy,
}

impl ModuleContext {
    pub fn reconciler<'a, A: ResourceAdapter + ?Sized>(&self, adapter: &'a A) -> Reconciler<'a, A> {
        Reconciler::new(adapter, self.check_mode, self.wait)
    }
}

/// `state` parameter shared by stateful modules
pub fn state_param() -> ArgSpec {
    ArgSpec::str().choices(["present", "absent"]).default("present")
}

/// Drive a stateful module through the reconciler and shape its outcome
pub async fn run_stateful<A: ResourceAdapter + ?Sized>(ctx: &ModuleContext, adapter: &A) -> Result<Outcome> {
    let state = DesiredState::from_params(&ctx.params);
    let reconciled = ctx.reconciler(adapter).reconcile(state, &ctx.params).await?;

    let mut outcome = Outcome::new(reconciled.changed);
    if let Some(resource) = reconciled.resource {
        outcome = outcome.with(adapter.kind(), query::strip_links(resource));
    }
    if ctx.diff {
        outcome = outcome.with_diff(reconciled.diff);
    }
    Ok(outcome)
}

/// Id field of a remote resource
pub fn resource_id(resource: &Value) -> Option<&str> {
    resource.get("id").and_then(Value::as_str)
}
