//! In-memory cloud for tests
//!
//! [`FakeCloud`] serves every service namespace from process memory and
//! records each mutating call, so scenarios can assert both the envelope
//! and what would have been sent to the cloud. [`StaticConnector`] hands
//! out a session over it and counts how often it was asked.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::args::Params;
use crate::error::Result;
use crate::otc::client::single;
use crate::otc::http::ApiError;
use crate::otc::session::Connector;
use crate::services::dns::normalize_zone_name;
use crate::services::vpc::{PEERING_ACTIVE, PEERING_REJECTED};
use crate::services::{DnsApi, NetworkApi, RdsApi, Session, VpcApi, WafApi};

pub const FAKE_REGION: &str = "eu-de";
pub const FAKE_PROJECT: &str = "0123456789abcdef0123456789abcdef";

/// Resource collections held by the fake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    SecurityGroups,
    Networks,
    Routers,
    Peerings,
    Instances,
    Certificates,
    Zones,
}

impl Store {
    fn kind(self) -> &'static str {
        match self {
            Store::SecurityGroups => "security group",
            Store::Networks => "network",
            Store::Routers => "router",
            Store::Peerings => "vpc peering",
            Store::Instances => "rds instance",
            Store::Certificates => "waf certificate",
            Store::Zones => "dns zone",
        }
    }
}

/// One recorded mutating call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: &'static str,
    pub target: String,
    pub body: Value,
}

#[derive(Debug, Default)]
struct State {
    security_groups: Vec<Value>,
    networks: Vec<Value>,
    routers: Vec<Value>,
    peerings: Vec<Value>,
    instances: Vec<Value>,
    certificates: Vec<Value>,
    zones: Vec<Value>,
    calls: Vec<Call>,
    next_id: u64,
}

impl State {
    fn store(&mut self, store: Store) -> &mut Vec<Value> {
        match store {
            Store::SecurityGroups => &mut self.security_groups,
            Store::Networks => &mut self.networks,
            Store::Routers => &mut self.routers,
            Store::Peerings => &mut self.peerings,
            Store::Instances => &mut self.instances,
            Store::Certificates => &mut self.certificates,
            Store::Zones => &mut self.zones,
        }
    }

    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("fake-{:04}", self.next_id)
    }
}

#[derive(Debug, Default)]
pub struct FakeCloud {
    state: Mutex<State>,
    never_ready: AtomicBool,
    fail_with: Mutex<Option<ApiError>>,
}

fn id_of(item: &Value) -> Option<&str> {
    item.get("id").and_then(Value::as_str)
}

fn name_of(item: &Value) -> Option<&str> {
    item.get("name").and_then(Value::as_str)
}

/// Query pair match on a top-level field or one nested a level down
fn matches_query(item: &Value, key: &str, value: &str) -> bool {
    let hit = |v: &Value| match v {
        Value::String(s) => s == value,
        Value::Number(n) => n.to_string() == value,
        _ => false,
    };
    if let Some(v) = item.get(key) {
        return hit(v);
    }
    item.as_object()
        .is_some_and(|map| map.values().any(|nested| nested.get(key).is_some_and(|v| hit(v))))
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session over this backend
    pub fn session(self: &Arc<Self>) -> Session {
        Session::from_backend(self.clone(), FAKE_REGION, FAKE_PROJECT)
    }

    /// Created resources stay in a building status forever
    pub fn never_ready(self) -> Self {
        self.never_ready.store(true, Ordering::SeqCst);
        self
    }

    /// Every following call fails with `error`
    pub fn fail_with(&self, error: ApiError) {
        *self.fail_with.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Add a resource, assigning an id unless it carries one
    pub fn seed(self, store: Store, mut item: Value) -> Self {
        {
            let mut state = self.state();
            if id_of(&item).is_none() {
                item["id"] = json!(state.fresh_id());
            }
            state.store(store).push(item);
        }
        self
    }

    pub fn with_security_group(self, name: &str, description: &str) -> Self {
        self.seed(
            Store::SecurityGroups,
            json!({"name": name, "description": description, "tenant_id": FAKE_PROJECT}),
        )
    }

    pub fn with_network(self, name: &str) -> Self {
        self.seed(Store::Networks, json!({"name": name, "status": "ACTIVE"}))
    }

    pub fn with_router(self, name: &str) -> Self {
        self.seed(Store::Routers, json!({"name": name, "status": "OK"}))
    }

    pub fn with_peering(self, name: &str, status: &str) -> Self {
        self.seed(Store::Peerings, json!({"name": name, "status": status}))
    }

    pub fn items(&self, store: Store) -> Vec<Value> {
        self.state().store(store).clone()
    }

    pub fn get(&self, store: Store, name_or_id: &str) -> Option<Value> {
        self.items(store)
            .into_iter()
            .find(|item| id_of(item) == Some(name_or_id) || name_of(item) == Some(name_or_id))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Recorded mutations, as `op` names
    pub fn ops(&self) -> Vec<&'static str> {
        self.state().calls.iter().map(|c| c.op).collect()
    }

    fn check_failure(&self) -> Result<(), ApiError> {
        match &*self.fail_with.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn record(&self, op: &'static str, target: &str, body: Value) {
        self.state().calls.push(Call {
            op,
            target: target.to_string(),
            body,
        });
    }

    fn building_status(&self) -> &'static str {
        if self.never_ready.load(Ordering::SeqCst) {
            "BUILD"
        } else {
            "ACTIVE"
        }
    }

    fn list(&self, store: Store, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>> {
        if let Err(e) = self.check_failure() {
            return stream::iter(vec![Err(e)]).boxed();
        }
        let items: Vec<Result<Value, ApiError>> = self
            .items(store)
            .into_iter()
            .filter(|item| query.iter().all(|(k, v)| matches_query(item, k, v)))
            .map(Ok)
            .collect();
        stream::iter(items).boxed()
    }

    fn find(&self, store: Store, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.check_failure()?;
        let matches: Vec<Value> = self
            .items(store)
            .into_iter()
            .filter(|item| id_of(item) == Some(name_or_id) || name_of(item) == Some(name_or_id))
            .collect();
        single(store.kind(), name_or_id, matches)
    }

    fn by_id(&self, store: Store, id: &str) -> Result<Option<Value>, ApiError> {
        self.check_failure()?;
        Ok(self.items(store).into_iter().find(|item| id_of(item) == Some(id)))
    }

    fn insert(&self, store: Store, op: &'static str, request: Value, stored: Value) -> Result<Value, ApiError> {
        self.check_failure()?;
        let target = name_of(&request).unwrap_or_default().to_string();
        self.record(op, &target, request);

        let mut state = self.state();
        let mut stored = stored;
        stored["id"] = json!(state.fresh_id());
        state.store(store).push(stored.clone());
        Ok(stored)
    }

    fn modify(&self, store: Store, op: &'static str, id: &str, body: Value, change: impl FnOnce(&mut Value)) -> Result<Value, ApiError> {
        self.check_failure()?;
        self.record(op, id, body);

        let mut state = self.state();
        let item = state
            .store(store)
            .iter_mut()
            .find(|item| id_of(item) == Some(id))
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: format!("{} {} not found", store.kind(), id),
            })?;
        change(item);
        Ok(item.clone())
    }

    fn remove(&self, store: Store, op: &'static str, id: &str) -> Result<(), ApiError> {
        self.check_failure()?;
        self.record(op, id, Value::Null);
        self.state().store(store).retain(|item| id_of(item) != Some(id));
        Ok(())
    }
}

fn merge(target: &mut Value, attrs: &Value) {
    if let (Value::Object(target), Value::Object(attrs)) = (target, attrs) {
        for (k, v) in attrs {
            target.insert(k.clone(), v.clone());
        }
    }
}

#[async_trait]
impl NetworkApi for FakeCloud {
    fn security_groups(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>> {
        self.list(Store::SecurityGroups, query)
    }

    async fn find_security_group(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(Store::SecurityGroups, name_or_id)
    }

    async fn create_security_group(&self, attrs: Value) -> Result<Value, ApiError> {
        let mut stored = attrs.clone();
        if stored.get("tenant_id").is_none() {
            stored["tenant_id"] = json!(FAKE_PROJECT);
        }
        stored["links"] = json!([{"rel": "self"}]);
        self.insert(Store::SecurityGroups, "create_security_group", attrs, stored)
    }

    async fn update_security_group(&self, id: &str, attrs: Value) -> Result<Value, ApiError> {
        let patch = attrs.clone();
        self.modify(Store::SecurityGroups, "update_security_group", id, attrs, |item| {
            merge(item, &patch)
        })
    }

    async fn delete_security_group(&self, id: &str) -> Result<(), ApiError> {
        self.remove(Store::SecurityGroups, "delete_security_group", id)
    }

    async fn find_network(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(Store::Networks, name_or_id)
    }
}

#[async_trait]
impl VpcApi for FakeCloud {
    async fn find_router(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(Store::Routers, name_or_id)
    }

    fn peerings(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>> {
        self.list(Store::Peerings, query)
    }

    async fn find_peering(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(Store::Peerings, name_or_id)
    }

    async fn accept_peering(&self, id: &str) -> Result<Value, ApiError> {
        self.modify(Store::Peerings, "accept_peering", id, Value::Null, |item| {
            item["status"] = json!(PEERING_ACTIVE)
        })
    }

    async fn reject_peering(&self, id: &str) -> Result<Value, ApiError> {
        self.modify(Store::Peerings, "reject_peering", id, Value::Null, |item| {
            item["status"] = json!(PEERING_REJECTED)
        })
    }
}

#[async_trait]
impl RdsApi for FakeCloud {
    fn instances(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>> {
        self.list(Store::Instances, query)
    }

    async fn find_instance(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(Store::Instances, name_or_id)
    }

    async fn get_instance(&self, id: &str) -> Result<Option<Value>, ApiError> {
        self.by_id(Store::Instances, id)
    }

    async fn create_instance(&self, attrs: Value) -> Result<Value, ApiError> {
        let mut stored = attrs.clone();
        if let Value::Object(map) = &mut stored {
            map.remove("password");
        }
        stored["status"] = json!(self.building_status());
        self.insert(Store::Instances, "create_instance", attrs, stored)
    }

    async fn resize_flavor(&self, id: &str, flavor: &str) -> Result<(), ApiError> {
        self.modify(
            Store::Instances,
            "resize_flavor",
            id,
            json!({"resize_flavor": {"spec_code": flavor}}),
            |item| item["flavor_ref"] = json!(flavor),
        )
        .map(|_| ())
    }

    async fn enlarge_volume(&self, id: &str, size: i64) -> Result<(), ApiError> {
        self.modify(
            Store::Instances,
            "enlarge_volume",
            id,
            json!({"enlarge_volume": {"size": size}}),
            |item| item["volume"]["size"] = json!(size),
        )
        .map(|_| ())
    }

    async fn delete_instance(&self, id: &str) -> Result<(), ApiError> {
        self.remove(Store::Instances, "delete_instance", id)
    }
}

#[async_trait]
impl WafApi for FakeCloud {
    fn certificates(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>> {
        self.list(Store::Certificates, query)
    }

    async fn find_certificate(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(Store::Certificates, name_or_id)
    }

    async fn create_certificate(&self, attrs: Value) -> Result<Value, ApiError> {
        // Only metadata is reported back
        let stored = json!({
            "name": attrs.get("name").cloned().unwrap_or(Value::Null),
            "expire_time": 1_900_000_000_000_i64,
        });
        self.insert(Store::Certificates, "create_certificate", attrs, stored)
    }

    async fn delete_certificate(&self, id: &str) -> Result<(), ApiError> {
        self.remove(Store::Certificates, "delete_certificate", id)
    }
}

#[async_trait]
impl DnsApi for FakeCloud {
    fn zones(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>> {
        self.list(Store::Zones, query)
    }

    async fn find_zone(&self, name_or_id: &str, zone_type: &str) -> Result<Option<Value>, ApiError> {
        self.check_failure()?;
        let name = normalize_zone_name(name_or_id);
        let matches: Vec<Value> = self
            .items(Store::Zones)
            .into_iter()
            .filter(|zone| zone.get("zone_type").and_then(Value::as_str) == Some(zone_type))
            .filter(|zone| id_of(zone) == Some(name_or_id) || name_of(zone) == Some(name.as_str()))
            .collect();
        single(Store::Zones.kind(), &name, matches)
    }

    async fn get_zone(&self, id: &str) -> Result<Option<Value>, ApiError> {
        self.by_id(Store::Zones, id)
    }

    async fn create_zone(&self, attrs: Value) -> Result<Value, ApiError> {
        let mut stored = attrs.clone();
        stored["status"] = json!(self.building_status());
        if stored.get("ttl").is_none() {
            stored["ttl"] = json!(300);
        }
        self.insert(Store::Zones, "create_zone", attrs, stored)
    }

    async fn update_zone(&self, id: &str, attrs: Value) -> Result<Value, ApiError> {
        let patch = attrs.clone();
        self.modify(Store::Zones, "update_zone", id, attrs, |item| merge(item, &patch))
    }

    async fn delete_zone(&self, id: &str) -> Result<(), ApiError> {
        self.remove(Store::Zones, "delete_zone", id)
    }
}

/// Connector returning a fixed session
pub struct StaticConnector {
    session: Session,
    connects: AtomicUsize,
}

impl StaticConnector {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for StaticConnector {
    async fn connect(&self, _params: &Params) -> Result<Session> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_duplicate_names() {
        let cloud = FakeCloud::new()
            .with_security_group("web", "a")
            .with_security_group("web", "b");
        let err = cloud.find_security_group("web").await.unwrap_err();
        assert!(matches!(err, ApiError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_list_query_nested() {
        let cloud = FakeCloud::new().seed(
            Store::Peerings,
            json!({"name": "p1", "status": "ACTIVE", "request_vpc_info": {"vpc_id": "r1"}}),
        );
        let hits: Vec<Value> = cloud
            .peerings(vec![("vpc_id".to_string(), "r1".to_string())])
            .try_collect()
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        let misses: Vec<Value> = cloud
            .peerings(vec![("vpc_id".to_string(), "r2".to_string())])
            .try_collect()
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn test_rds_password_not_stored() {
        let cloud = FakeCloud::new();
        let created = cloud
            .create_instance(json!({"name": "db", "password": "hunter2"}))
            .await
            .unwrap();
        assert!(created.get("password").is_none());
        assert_eq!(cloud.calls()[0].body["password"], "hunter2");
    }
}
