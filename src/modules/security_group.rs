//! `security_group`: manage a Neutron security group

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::args::{ArgSpec, ArgumentSpec, Params};
use crate::envelope::Outcome;
use crate::error::{ModuleError, Result};
use crate::module::{resource_id, run_stateful, state_param, Module, ModuleContext};
use crate::reconcile::{Attribute, Diff, ResourceAdapter};
use crate::services::Session;

const UPDATABLE: &[Attribute] = &[Attribute::scalar("description", "description")];

pub struct SecurityGroup;

#[async_trait]
impl Module for SecurityGroup {
    fn name(&self) -> &'static str {
        "security_group"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new()
            .param("name", ArgSpec::str().required())
            .param("description", ArgSpec::str())
            .param("project_id", ArgSpec::str())
            .param("state", state_param())
    }

    async fn run(&self, ctx: &ModuleContext) -> Result<Outcome> {
        let adapter = SecurityGroupAdapter {
            params: &ctx.params,
            session: &ctx.session,
            name: ctx.params.get_str("name").unwrap_or_default(),
        };
        run_stateful(ctx, &adapter).await
    }
}

struct SecurityGroupAdapter<'a> {
    params: &'a Params,
    session: &'a Session,
    name: &'a str,
}

#[async_trait]
impl<'a> ResourceAdapter for SecurityGroupAdapter<'a> {
    fn kind(&self) -> &'static str {
        "security_group"
    }

    fn identity(&self) -> &str {
        self.name
    }

    fn updatable(&self) -> &'static [Attribute] {
        UPDATABLE
    }

    async fn find(&self) -> Result<Option<Value>> {
        Ok(self.session.network.find_security_group(self.name).await?)
    }

    async fn creation_bundle(&self) -> Result<Value> {
        let mut bundle = json!({ "name": self.name });
        if let Some(description) = self.params.get_str("description") {
            bundle["description"] = json!(description);
        }
        if let Some(project_id) = self.params.get_str("project_id") {
            bundle["tenant_id"] = json!(project_id);
        }
        Ok(bundle)
    }

    async fn create(&self, bundle: &Value) -> Result<Value> {
        Ok(self.session.network.create_security_group(bundle.clone()).await?)
    }

    async fn update(&self, existing: &Value, diff: &Diff) -> Result<Value> {
        let id = resource_id(existing)
            .ok_or_else(|| ModuleError::internal("security group without id"))?;
        Ok(self
            .session
            .network
            .update_security_group(id, diff.after())
            .await?)
    }

    async fn delete(&self, existing: &Value) -> Result<()> {
        let id = resource_id(existing)
            .ok_or_else(|| ModuleError::internal("security group without id"))?;
        Ok(self.session.network.delete_security_group(id).await?)
    }

    async fn refresh(&self, resource: &Value) -> Result<Option<Value>> {
        match resource_id(resource) {
            Some(id) => Ok(self.session.network.find_security_group(id).await?),
            None => Ok(None),
        }
    }
}
