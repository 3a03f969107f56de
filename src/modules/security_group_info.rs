//! `security_group_info`: list security groups

use async_trait::async_trait;
use serde_json::Value;

use crate::args::{ArgSpec, ArgumentSpec};
use crate::envelope::Outcome;
use crate::error::Result;
use crate::module::query::{collect, PostFilter};
use crate::module::{Module, ModuleContext};
use crate::services::query;

pub struct SecurityGroupInfo;

#[async_trait]
impl Module for SecurityGroupInfo {
    fn name(&self) -> &'static str {
        "security_group_info"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new()
            .param("name", ArgSpec::str())
            .param("project_id", ArgSpec::str())
    }

    async fn run(&self, ctx: &ModuleContext) -> Result<Outcome> {
        let params = &ctx.params;

        let api_query = match params.get_str("project_id") {
            Some(project_id) => query(&[("tenant_id", project_id)]),
            None => Vec::new(),
        };
        let filters: Vec<PostFilter> = params
            .get_str("name")
            .map(|name| PostFilter::new("name", name))
            .into_iter()
            .collect();

        let groups = collect(ctx.session.network.security_groups(api_query), &filters).await?;
        tracing::debug!("Found {} security groups", groups.len());

        Ok(Outcome::unchanged().with("security_groups", Value::Array(groups)))
    }
}
