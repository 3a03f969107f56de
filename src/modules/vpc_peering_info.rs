//! `vpc_peering_info`: list VPC peerings

use async_trait::async_trait;
use serde_json::Value;

use crate::args::{ArgSpec, ArgumentSpec};
use crate::envelope::Outcome;
use crate::error::{ModuleError, Result};
use crate::module::query::{collect, PostFilter};
use crate::module::{resource_id, Module, ModuleContext};
use crate::services::query;

pub struct VpcPeeringInfo;

#[async_trait]
impl Module for VpcPeeringInfo {
    fn name(&self) -> &'static str {
        "vpc_peering_info"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new()
            .param("name", ArgSpec::str())
            .param("status", ArgSpec::str())
            .param("router", ArgSpec::str())
            .param("project_id", ArgSpec::str())
    }

    async fn run(&self, ctx: &ModuleContext) -> Result<Outcome> {
        let params = &ctx.params;
        let mut api_query = Vec::new();

        if let Some(router) = params.get_str("router") {
            let found = ctx.session.vpc.find_router(router).await?;
            let Some(router_id) = found.as_ref().and_then(resource_id) else {
                return Err(ModuleError::precondition(format!("router '{}' not found", router)));
            };
            api_query.extend(query(&[("vpc_id", router_id)]));
        }
        if let Some(project_id) = params.get_str("project_id") {
            api_query.extend(query(&[("tenant_id", project_id)]));
        }

        let mut filters = Vec::new();
        if let Some(name) = params.get_str("name") {
            filters.push(PostFilter::new("name", name));
        }
        if let Some(status) = params.get_str("status") {
            filters.push(PostFilter::new("status", status.to_ascii_uppercase()));
        }

        let peerings = collect(ctx.session.vpc.peerings(api_query), &filters).await?;
        Ok(Outcome::unchanged().with("vpc_peerings", Value::Array(peerings)))
    }
}
