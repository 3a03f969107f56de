//! `rds_instance`: create, resize or delete an RDS instance

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::args::{ArgSpec, ArgumentSpec, Params};
use crate::envelope::Outcome;
use crate::error::{ModuleError, Result};
use crate::module::{resource_id, run_stateful, state_param, Module, ModuleContext};
use crate::reconcile::{Attribute, Compare, Diff, Readiness, ResourceAdapter};
use crate::services::Session;

const UPDATABLE: &[Attribute] = &[
    Attribute::scalar("flavor", "flavor_ref"),
    Attribute::scalar("volume_size", "volume.size"),
];

const NON_UPDATABLE: &[Attribute] = &[
    Attribute::new("datastore_type", "datastore.type", Compare::CaseInsensitive),
    Attribute::new("datastore_version", "datastore.version", Compare::CaseInsensitive),
    Attribute::new("availability_zone", "availability_zone", Compare::CaseInsensitive),
    Attribute::new("volume_type", "volume.type", Compare::CaseInsensitive),
];

pub struct RdsInstance;

#[async_trait]
impl Module for RdsInstance {
    fn name(&self) -> &'static str {
        "rds_instance"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new()
            .param("name", ArgSpec::str().required())
            .param("state", state_param())
            .param(
                "datastore_type",
                ArgSpec::str()
                    .choices(["mysql", "postgresql", "sqlserver"])
                    .default("postgresql"),
            )
            .param("datastore_version", ArgSpec::str())
            .param("flavor", ArgSpec::str())
            .param("availability_zone", ArgSpec::str())
            .param("region", ArgSpec::str())
            .param("router", ArgSpec::str())
            .param("network", ArgSpec::str())
            .param("security_group", ArgSpec::str())
            .param("volume_type", ArgSpec::str().default("common"))
            .param("volume_size", ArgSpec::int())
            .param("password", ArgSpec::str().sensitive())
            .param("port", ArgSpec::int())
            .param("ha_mode", ArgSpec::str().choices(["async", "semisync", "sync"]))
            .param("backup_keepdays", ArgSpec::int())
            .param("backup_timeframe", ArgSpec::str())
            .required_if(
                "state",
                "present",
                &[
                    "datastore_version",
                    "flavor",
                    "availability_zone",
                    "router",
                    "network",
                    "security_group",
                    "volume_size",
                    "password",
                ],
            )
            .required_together(&["backup_keepdays", "backup_timeframe"])
    }

    /// RDS v3 flavors and actions
    fn min_sdk_version(&self) -> Option<&'static str> {
        Some("0.2.0")
    }

    async fn run(&self, ctx: &ModuleContext) -> Result<Outcome> {
        let adapter = RdsAdapter {
            params: &ctx.params,
            session: &ctx.session,
            name: ctx.params.get_str("name").unwrap_or_default(),
        };
        run_stateful(ctx, &adapter).await
    }
}

struct RdsAdapter<'a> {
    params: &'a Params,
    session: &'a Session,
    name: &'a str,
}

impl<'a> RdsAdapter<'a> {
    /// Id of a related resource, or precondition-failed naming it
    async fn related_id(&self, param: &str) -> Result<String> {
        let Some(name_or_id) = self.params.get_str(param) else {
            return Err(ModuleError::invalid(format!("{} is required to create an instance", param)));
        };
        let found = match param {
            "router" => self.session.vpc.find_router(name_or_id).await?,
            "network" => self.session.network.find_network(name_or_id).await?,
            "security_group" => self.session.network.find_security_group(name_or_id).await?,
            other => return Err(ModuleError::internal(format!("no resolver for {}", other))),
        };
        found
            .as_ref()
            .and_then(resource_id)
            .map(str::to_string)
            .ok_or_else(|| {
                ModuleError::precondition(format!("{} '{}' not found", param.replace('_', " "), name_or_id))
            })
    }
}

#[async_trait]
impl<'a> ResourceAdapter for RdsAdapter<'a> {
    fn kind(&self) -> &'static str {
        "rds_instance"
    }

    fn identity(&self) -> &str {
        self.name
    }

    fn updatable(&self) -> &'static [Attribute] {
        UPDATABLE
    }

    fn non_updatable(&self) -> &'static [Attribute] {
        NON_UPDATABLE
    }

    async fn find(&self) -> Result<Option<Value>> {
        Ok(self.session.rds.find_instance(self.name).await?)
    }

    async fn creation_bundle(&self) -> Result<Value> {
        let p = self.params;
        let mut bundle = Map::new();
        bundle.insert("name".into(), json!(self.name));
        bundle.insert(
            "datastore".into(),
            json!({
                "type": p.get_str("datastore_type").unwrap_or("postgresql"),
                "version": p.get_str("datastore_version"),
            }),
        );
        bundle.insert("flavor_ref".into(), json!(p.get_str("flavor")));
        bundle.insert(
            "volume".into(),
            json!({
                "type": p.get_str("volume_type").unwrap_or("common").to_ascii_uppercase(),
                "size": p.get_i64("volume_size"),
            }),
        );
        bundle.insert(
            "region".into(),
            json!(p.get_str("region").unwrap_or(self.session.region())),
        );

        let availability_zone = p.get_str("availability_zone").unwrap_or_default();
        bundle.insert("availability_zone".into(), json!(availability_zone));
        if availability_zone.contains(',') {
            bundle.insert(
                "ha".into(),
                json!({
                    "mode": "ha",
                    "replication_mode": p.get_str("ha_mode").unwrap_or("async"),
                }),
            );
        }

        bundle.insert("vpc_id".into(), json!(self.related_id("router").await?));
        bundle.insert("subnet_id".into(), json!(self.related_id("network").await?));
        bundle.insert(
            "security_group_id".into(),
            json!(self.related_id("security_group").await?),
        );

        if let Some(port) = p.get_i64("port") {
            bundle.insert("port".into(), json!(port.to_string()));
        }
        if let (Some(days), Some(window)) = (p.get_i64("backup_keepdays"), p.get_str("backup_timeframe")) {
            bundle.insert(
                "backup_strategy".into(),
                json!({ "keep_days": days, "start_time": window }),
            );
        }

        Ok(Value::Object(bundle))
    }

    async fn create(&self, bundle: &Value) -> Result<Value> {
        let password = self
            .params
            .secret("password")
            .and_then(|s| s.expose().as_str())
            .ok_or_else(|| ModuleError::invalid("password is required to create an instance"))?;

        let mut request = bundle.clone();
        request["password"] = json!(password);
        Ok(self.session.rds.create_instance(request).await?)
    }

    async fn update(&self, existing: &Value, diff: &Diff) -> Result<Value> {
        let id = resource_id(existing)
            .ok_or_else(|| ModuleError::internal("rds instance without id"))?;

        if let Some(change) = diff.get("volume_size") {
            let current = change.before.as_i64().unwrap_or(0);
            let requested = change.after.as_i64().unwrap_or(0);
            if requested < current {
                return Err(ModuleError::conflict(format!(
                    "rds_instance '{}': volume_size can only grow ({} -> {})",
                    self.name, current, requested
                )));
            }
        }

        if let Some(flavor) = diff.get("flavor").and_then(|c| c.after.as_str()) {
            self.session.rds.resize_flavor(id, flavor).await?;
        }
        if let Some(size) = diff.get("volume_size").and_then(|c| c.after.as_i64()) {
            self.session.rds.enlarge_volume(id, size).await?;
        }

        self.session
            .rds
            .get_instance(id)
            .await?
            .ok_or_else(|| ModuleError::not_found(format!("rds_instance '{}' vanished during update", self.name)))
    }

    async fn delete(&self, existing: &Value) -> Result<()> {
        let id = resource_id(existing)
            .ok_or_else(|| ModuleError::internal("rds instance without id"))?;
        Ok(self.session.rds.delete_instance(id).await?)
    }

    async fn refresh(&self, resource: &Value) -> Result<Option<Value>> {
        match resource_id(resource) {
            Some(id) => Ok(self.session.rds.get_instance(id).await?),
            None => Ok(None),
        }
    }

    fn readiness(&self, resource: &Value) -> Readiness {
        match resource.get("status").and_then(Value::as_str) {
            Some("ACTIVE") => Readiness::Ready,
            Some(status @ ("FAILED" | "ERROR" | "ABNORMAL")) => Readiness::Failed(status.to_string()),
            _ => Readiness::Pending,
        }
    }
}
