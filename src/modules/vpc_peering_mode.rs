//! `vpc_peering_mode`: accept or reject a pending VPC peering request
//!
//! Only a peering in `PENDING_ACCEPTANCE` can change. A peering already in
//! the requested terminal state is left alone; any other status is a
//! conflict the caller has to resolve.

use async_trait::async_trait;
use serde_json::Value;

use crate::args::{ArgSpec, ArgumentSpec};
use crate::envelope::Outcome;
use crate::error::{ModuleError, Result};
use crate::module::query::strip_links;
use crate::module::{resource_id, Module, ModuleContext};
use crate::services::vpc::{PEERING_ACTIVE, PEERING_PENDING, PEERING_REJECTED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Accept,
    Reject,
}

impl Mode {
    fn parse(mode: &str) -> Result<Self> {
        match mode {
            "accept" => Ok(Mode::Accept),
            "reject" => Ok(Mode::Reject),
            other => Err(ModuleError::invalid(format!("unsupported mode '{}'", other))),
        }
    }

    /// Status the peering settles in once the request is answered
    fn settled_status(self) -> &'static str {
        match self {
            Mode::Accept => PEERING_ACTIVE,
            Mode::Reject => PEERING_REJECTED,
        }
    }
}

pub struct VpcPeeringMode;

#[async_trait]
impl Module for VpcPeeringMode {
    fn name(&self) -> &'static str {
        "vpc_peering_mode"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new()
            .param("name", ArgSpec::str().required())
            .param("mode", ArgSpec::str().choices(["accept", "reject"]).required())
    }

    async fn run(&self, ctx: &ModuleContext) -> Result<Outcome> {
        let name = ctx.params.get_str("name").unwrap_or_default();
        let mode = Mode::parse(ctx.params.get_str("mode").unwrap_or_default())?;
        let vpc = &ctx.session.vpc;

        let Some(peering) = vpc.find_peering(name).await? else {
            return Err(ModuleError::not_found(format!("vpc peering '{}' not found", name)));
        };
        let status = peering.get("status").and_then(Value::as_str).unwrap_or_default();

        if status == mode.settled_status() {
            return Ok(Outcome::unchanged().with("vpc_peering", strip_links(peering)));
        }
        if status != PEERING_PENDING {
            return Err(ModuleError::conflict(format!(
                "vpc peering '{}' is {}, only {} requests can be answered",
                name, status, PEERING_PENDING
            )));
        }

        if ctx.check_mode {
            return Ok(Outcome::new(true).with("vpc_peering", strip_links(peering)));
        }

        let id = resource_id(&peering)
            .ok_or_else(|| ModuleError::internal("vpc peering without id"))?;
        tracing::info!("Answering vpc peering '{}' with {:?}", name, mode);
        let answered = match mode {
            Mode::Accept => vpc.accept_peering(id).await?,
            Mode::Reject => vpc.reject_peering(id).await?,
        };

        Ok(Outcome::new(true).with("vpc_peering", strip_links(answered)))
    }
}
