//! `dns_zone`: manage a public or private DNS zone

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::args::{ArgSpec, ArgumentSpec, Params};
use crate::envelope::Outcome;
use crate::error::{ModuleError, Result};
use crate::module::{resource_id, run_stateful, state_param, Module, ModuleContext};
use crate::reconcile::{Attribute, Compare, Diff, Readiness, ResourceAdapter};
use crate::services::dns::normalize_zone_name;
use crate::services::Session;

const UPDATABLE: &[Attribute] = &[
    Attribute::scalar("email", "email"),
    Attribute::scalar("description", "description"),
    Attribute::scalar("ttl", "ttl"),
];

const NON_UPDATABLE: &[Attribute] = &[Attribute::new("zone_type", "zone_type", Compare::CaseInsensitive)];

pub struct DnsZone;

#[async_trait]
impl Module for DnsZone {
    fn name(&self) -> &'static str {
        "dns_zone"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new()
            .param("name", ArgSpec::str().required())
            .param("zone_type", ArgSpec::str().choices(["public", "private"]).default("public"))
            .param("email", ArgSpec::str())
            .param("description", ArgSpec::str())
            .param("ttl", ArgSpec::int())
            .param("router", ArgSpec::str())
            .param("state", state_param())
            .required_if("zone_type", "private", &["router"])
    }

    async fn run(&self, ctx: &ModuleContext) -> Result<Outcome> {
        let adapter = ZoneAdapter {
            params: &ctx.params,
            session: &ctx.session,
            name: normalize_zone_name(ctx.params.get_str("name").unwrap_or_default()),
            zone_type: ctx.params.get_str("zone_type").unwrap_or("public"),
        };
        run_stateful(ctx, &adapter).await
    }
}

struct ZoneAdapter<'a> {
    params: &'a Params,
    session: &'a Session,
    /// Fully qualified, with the trailing dot
    name: String,
    zone_type: &'a str,
}

#[async_trait]
impl<'a> ResourceAdapter for ZoneAdapter<'a> {
    fn kind(&self) -> &'static str {
        "dns_zone"
    }

    fn identity(&self) -> &str {
        &self.name
    }

    fn updatable(&self) -> &'static [Attribute] {
        UPDATABLE
    }

    fn non_updatable(&self) -> &'static [Attribute] {
        NON_UPDATABLE
    }

    async fn find(&self) -> Result<Option<Value>> {
        Ok(self.session.dns.find_zone(&self.name, self.zone_type).await?)
    }

    async fn creation_bundle(&self) -> Result<Value> {
        let p = self.params;
        let mut bundle = json!({
            "name": self.name,
            "zone_type": self.zone_type,
        });
        for key in ["email", "description"] {
            if let Some(value) = p.get_str(key) {
                bundle[key] = json!(value);
            }
        }
        if let Some(ttl) = p.get_i64("ttl") {
            bundle["ttl"] = json!(ttl);
        }

        if self.zone_type == "private" {
            let router = p
                .get_str("router")
                .ok_or_else(|| ModuleError::invalid("router is required for private zones"))?;
            let found = self.session.vpc.find_router(router).await?;
            let router_id = found
                .as_ref()
                .and_then(resource_id)
                .ok_or_else(|| ModuleError::precondition(format!("router '{}' not found", router)))?;
            bundle["router"] = json!({
                "router_id": router_id,
                "router_region": self.session.region(),
            });
        }

        Ok(bundle)
    }

    async fn create(&self, bundle: &Value) -> Result<Value> {
        Ok(self.session.dns.create_zone(bundle.clone()).await?)
    }

    async fn update(&self, existing: &Value, diff: &Diff) -> Result<Value> {
        let id = resource_id(existing)
            .ok_or_else(|| ModuleError::internal("dns zone without id"))?;
        Ok(self.session.dns.update_zone(id, diff.after()).await?)
    }

    async fn delete(&self, existing: &Value) -> Result<()> {
        let id = resource_id(existing)
            .ok_or_else(|| ModuleError::internal("dns zone without id"))?;
        Ok(self.session.dns.delete_zone(id).await?)
    }

    async fn refresh(&self, resource: &Value) -> Result<Option<Value>> {
        match resource_id(resource) {
            Some(id) => Ok(self.session.dns.get_zone(id).await?),
            None => Ok(None),
        }
    }

    fn readiness(&self, resource: &Value) -> Readiness {
        match resource.get("status").and_then(Value::as_str) {
            Some("ACTIVE") | None => Readiness::Ready,
            Some("ERROR") => Readiness::Failed("ERROR".to_string()),
            _ => Readiness::Pending,
        }
    }
}
