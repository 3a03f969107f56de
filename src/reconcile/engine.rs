//! Present/absent state machine
//!
//! [`Reconciler::plan`] reads the remote resource and decides the
//! [`Transition`]; [`Reconciler::apply`] carries it out. Check mode shares
//! the planner and skips the apply side effects entirely.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::drift::{Attribute, Diff};
use super::wait::{poll_until, Probe, WaitPolicy};
use crate::args::Params;
use crate::error::{ModuleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    Present,
    Absent,
}

impl DesiredState {
    /// From the `state` parameter; anything but `absent` means present
    pub fn from_params(params: &Params) -> Self {
        match params.get_str("state") {
            Some("absent") => Self::Absent,
            _ => Self::Present,
        }
    }
}

/// Lifecycle status of a remote resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Pending,
    Failed(String),
}

/// Per-resource hooks driven by the [`Reconciler`]
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Resource kind, also the envelope key of the result
    fn kind(&self) -> &'static str;

    /// Name or id the resource is looked up by
    fn identity(&self) -> &str;

    /// Attributes whose drift is reconciled by [`ResourceAdapter::update`]
    fn updatable(&self) -> &'static [Attribute] {
        &[]
    }

    /// Attributes whose drift cannot be reconciled in place
    fn non_updatable(&self) -> &'static [Attribute] {
        &[]
    }

    fn supports_update(&self) -> bool {
        true
    }

    /// Current remote resource, `None` if it does not exist
    async fn find(&self) -> Result<Option<Value>>;

    /// Attributes to create the resource with. Related resources are
    /// resolved here, so a missing one fails before anything is mutated.
    async fn creation_bundle(&self) -> Result<Value>;

    async fn create(&self, bundle: &Value) -> Result<Value>;

    async fn update(&self, existing: &Value, diff: &Diff) -> Result<Value> {
        let _ = (existing, diff);
        Err(ModuleError::internal(format!("{} does not support update", self.kind())))
    }

    async fn delete(&self, existing: &Value) -> Result<()>;

    /// Re-read a resource; `None` once it is gone
    async fn refresh(&self, resource: &Value) -> Result<Option<Value>>;

    fn readiness(&self, resource: &Value) -> Readiness {
        let _ = resource;
        Readiness::Ready
    }
}

/// Decided action
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Noop { existing: Option<Value> },
    Create { bundle: Value },
    Update { existing: Value, diff: Diff },
    Delete { existing: Value },
}

impl Transition {
    pub fn changed(&self) -> bool {
        !matches!(self, Transition::Noop { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Noop { .. } => "none",
            Transition::Create { .. } => "create",
            Transition::Update { .. } => "update",
            Transition::Delete { .. } => "delete",
        }
    }

    /// `{before, after}` for diff mode
    fn diff(&self, resource: Option<&Value>) -> Value {
        match self {
            Transition::Noop { existing } => {
                let v = existing.clone().unwrap_or(Value::Null);
                json!({ "before": v, "after": v })
            }
            Transition::Create { bundle } => {
                json!({ "before": Value::Null, "after": resource.unwrap_or(bundle) })
            }
            Transition::Update { diff, .. } => json!({ "before": diff.before(), "after": diff.after() }),
            Transition::Delete { existing } => json!({ "before": existing, "after": Value::Null }),
        }
    }
}

/// Outcome of one reconcile
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub changed: bool,
    /// Remote representation after reconciliation; `None` when absent
    pub resource: Option<Value>,
    pub diff: Value,
}

pub struct Reconciler<'a, A: ResourceAdapter + ?Sized> {
    adapter: &'a A,
    check_mode: bool,
    wait: WaitPolicy,
}

impl<'a, A: ResourceAdapter + ?Sized> Reconciler<'a, A> {
    pub fn new(adapter: &'a A, check_mode: bool, wait: WaitPolicy) -> Self {
        Self {
            adapter,
            check_mode,
            wait,
        }
    }

    /// Plan, then apply unless in check mode
    pub async fn reconcile(&self, state: DesiredState, params: &Params) -> Result<Reconciled> {
        let transition = self.plan(state, params).await?;
        self.apply(transition).await
    }

    pub async fn plan(&self, state: DesiredState, params: &Params) -> Result<Transition> {
        let kind = self.adapter.kind();
        let identity = self.adapter.identity();
        let existing = self.adapter.find().await?;

        let transition = match (existing, state) {
            (None, DesiredState::Absent) => Transition::Noop { existing: None },
            (Some(existing), DesiredState::Absent) => Transition::Delete { existing },
            (None, DesiredState::Present) => Transition::Create {
                bundle: self.adapter.creation_bundle().await?,
            },
            (Some(existing), DesiredState::Present) => {
                let frozen = Diff::compute(self.adapter.non_updatable(), params, &existing, true);
                if !frozen.is_empty() {
                    return Err(ModuleError::conflict(format!(
                        "{} '{}': {} cannot be changed in place, delete and recreate the resource",
                        kind,
                        identity,
                        frozen.describe()
                    )));
                }

                let diff = Diff::compute(self.adapter.updatable(), params, &existing, false);
                if diff.is_empty() {
                    Transition::Noop {
                        existing: Some(existing),
                    }
                } else if !self.adapter.supports_update() {
                    return Err(ModuleError::conflict(format!(
                        "{} '{}' cannot be updated ({}), delete and recreate the resource",
                        kind,
                        identity,
                        diff.describe()
                    )));
                } else {
                    Transition::Update { existing, diff }
                }
            }
        };

        tracing::info!(
            "{} '{}': planned {}{}",
            kind,
            identity,
            transition.name(),
            if self.check_mode { " (check mode)" } else { "" }
        );
        Ok(transition)
    }

    pub async fn apply(&self, transition: Transition) -> Result<Reconciled> {
        if self.check_mode {
            let resource = match &transition {
                Transition::Noop { existing } => existing.clone(),
                Transition::Update { existing, .. } | Transition::Delete { existing } => Some(existing.clone()),
                Transition::Create { .. } => None,
            };
            return Ok(Reconciled {
                changed: transition.changed(),
                diff: transition.diff(None),
                resource,
            });
        }

        let kind = self.adapter.kind();
        let identity = self.adapter.identity();

        let resource = match &transition {
            Transition::Noop { existing } => existing.clone(),
            Transition::Create { bundle } => {
                tracing::info!("Creating {} '{}'", kind, identity);
                let created = self.adapter.create(bundle).await?;
                if self.wait.enabled {
                    let ready = self.await_ready(&created).await.map_err(|e| {
                        e.map_reason(|r| format!("{} '{}' was created but {}", kind, identity, r))
                    })?;
                    Some(ready)
                } else {
                    Some(created)
                }
            }
            Transition::Update { existing, diff } => {
                tracing::info!("Updating {} '{}': {}", kind, identity, diff.describe());
                let updated = self.adapter.update(existing, diff).await?;
                if self.wait.enabled {
                    let ready = self.await_ready(&updated).await.map_err(|e| {
                        e.map_reason(|r| format!("{} '{}' was updated but {}", kind, identity, r))
                    })?;
                    Some(ready)
                } else {
                    Some(updated)
                }
            }
            Transition::Delete { existing } => {
                tracing::info!("Deleting {} '{}'", kind, identity);
                self.adapter.delete(existing).await?;
                if self.wait.enabled {
                    self.await_gone(existing).await.map_err(|e| {
                        e.map_reason(|r| format!("deletion of {} '{}' was accepted but {}", kind, identity, r))
                    })?;
                }
                None
            }
        };

        Ok(Reconciled {
            changed: transition.changed(),
            diff: transition.diff(resource.as_ref()),
            resource,
        })
    }

    async fn await_ready(&self, resource: &Value) -> Result<Value> {
        let adapter = self.adapter;
        poll_until(&self.wait, "ready state", move || async move {
            let Some(current) = adapter.refresh(resource).await? else {
                return Err(ModuleError::not_found("resource disappeared while waiting for it"));
            };
            match adapter.readiness(&current) {
                Readiness::Ready => Ok(Probe::Done(current)),
                Readiness::Pending => Ok(Probe::Pending),
                Readiness::Failed(status) => {
                    Err(ModuleError::connectivity(format!("resource entered status {}", status)))
                }
            }
        })
        .await
    }

    async fn await_gone(&self, resource: &Value) -> Result<()> {
        let adapter = self.adapter;
        poll_until(&self.wait, "removal", move || async move {
            Ok(match adapter.refresh(resource).await? {
                None => Probe::Done(()),
                Some(_) => Probe::Pending,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{ArgSpec, ArgumentSpec};
    use crate::reconcile::drift::Compare;
    use std::sync::Mutex;
    use std::time::Duration;

    const UPDATABLE: &[Attribute] = &[Attribute::scalar("size", "size")];
    const FROZEN: &[Attribute] = &[Attribute::new("flavor", "flavor", Compare::CaseInsensitive)];

    /// Single-slot backend recording mutations
    struct Slot {
        remote: Mutex<Option<Value>>,
        calls: Mutex<Vec<&'static str>>,
        status_after_create: &'static str,
    }

    impl Slot {
        fn new(remote: Option<Value>) -> Self {
            Self {
                remote: Mutex::new(remote),
                calls: Mutex::new(Vec::new()),
                status_after_create: "ACTIVE",
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResourceAdapter for Slot {
        fn kind(&self) -> &'static str {
            "widget"
        }

        fn identity(&self) -> &str {
            "w1"
        }

        fn updatable(&self) -> &'static [Attribute] {
            UPDATABLE
        }

        fn non_updatable(&self) -> &'static [Attribute] {
            FROZEN
        }

        async fn find(&self) -> Result<Option<Value>> {
            Ok(self.remote.lock().unwrap().clone())
        }

        async fn creation_bundle(&self) -> Result<Value> {
            Ok(json!({"name": "w1", "size": 1}))
        }

        async fn create(&self, bundle: &Value) -> Result<Value> {
            self.calls.lock().unwrap().push("create");
            let mut created = bundle.clone();
            created["status"] = json!(self.status_after_create);
            *self.remote.lock().unwrap() = Some(created.clone());
            Ok(created)
        }

        async fn update(&self, existing: &Value, diff: &Diff) -> Result<Value> {
            self.calls.lock().unwrap().push("update");
            let mut updated = existing.clone();
            updated["size"] = diff.get("size").unwrap().after.clone();
            *self.remote.lock().unwrap() = Some(updated.clone());
            Ok(updated)
        }

        async fn delete(&self, _existing: &Value) -> Result<()> {
            self.calls.lock().unwrap().push("delete");
            *self.remote.lock().unwrap() = None;
            Ok(())
        }

        async fn refresh(&self, _resource: &Value) -> Result<Option<Value>> {
            Ok(self.remote.lock().unwrap().clone())
        }

        fn readiness(&self, resource: &Value) -> Readiness {
            match resource["status"].as_str() {
                Some("ACTIVE") => Readiness::Ready,
                Some("ERROR") => Readiness::Failed("ERROR".to_string()),
                _ => Readiness::Pending,
            }
        }
    }

    fn params(args: Value) -> Params {
        ArgumentSpec::new()
            .param("state", ArgSpec::str().choices(["present", "absent"]).default("present"))
            .param("size", ArgSpec::int())
            .param("flavor", ArgSpec::str())
            .validate(args.as_object().unwrap())
            .unwrap()
    }

    fn nowait() -> WaitPolicy {
        WaitPolicy::disabled()
    }

    fn wait(timeout_ms: u64) -> WaitPolicy {
        WaitPolicy {
            enabled: true,
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_create_then_noop() {
        let slot = Slot::new(None);
        let p = params(json!({"size": 1}));

        let first = Reconciler::new(&slot, false, nowait())
            .reconcile(DesiredState::Present, &p)
            .await
            .unwrap();
        assert!(first.changed);
        assert_eq!(first.resource.as_ref().unwrap()["name"], "w1");

        let second = Reconciler::new(&slot, false, nowait())
            .reconcile(DesiredState::Present, &p)
            .await
            .unwrap();
        assert!(!second.changed);
        assert_eq!(slot.calls(), vec!["create"]);
    }

    #[tokio::test]
    async fn test_update_on_updatable_drift() {
        let slot = Slot::new(Some(json!({"name": "w1", "size": 1, "flavor": "small", "status": "ACTIVE"})));
        let done = Reconciler::new(&slot, false, wait(1_000))
            .reconcile(DesiredState::Present, &params(json!({"size": 5, "flavor": "SMALL"})))
            .await
            .unwrap();
        assert!(done.changed);
        assert_eq!(done.resource.unwrap()["size"], 5);
        assert_eq!(done.diff, json!({"before": {"size": 1}, "after": {"size": 5}}));
        assert_eq!(slot.calls(), vec!["update"]);
    }

    #[tokio::test]
    async fn test_conflict_on_frozen_drift_without_update() {
        let slot = Slot::new(Some(json!({"name": "w1", "size": 1, "flavor": "small"})));
        let err = Reconciler::new(&slot, false, nowait())
            .reconcile(DesiredState::Present, &params(json!({"size": 5, "flavor": "large"})))
            .await
            .unwrap_err();
        assert_eq!(err.taxon(), "conflict");
        assert!(err.to_string().contains("widget 'w1'"));
        assert!(slot.calls().is_empty());
    }

    #[tokio::test]
    async fn test_check_mode_never_mutates() {
        for (remote, args, expected) in [
            (None, json!({}), true),
            (Some(json!({"name": "w1", "size": 1})), json!({"size": 2}), true),
            (Some(json!({"name": "w1", "size": 1})), json!({"state": "absent"}), true),
            (None, json!({"state": "absent"}), false),
        ] {
            let slot = Slot::new(remote);
            let p = params(args);
            let result = Reconciler::new(&slot, true, wait(0))
                .reconcile(DesiredState::from_params(&p), &p)
                .await
                .unwrap();
            assert_eq!(result.changed, expected);
            assert!(slot.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_absent_twice() {
        let slot = Slot::new(Some(json!({"name": "w1"})));
        let p = params(json!({"state": "absent"}));
        let r = Reconciler::new(&slot, false, wait(1_000));
        assert!(r.reconcile(DesiredState::Absent, &p).await.unwrap().changed);
        assert!(!r.reconcile(DesiredState::Absent, &p).await.unwrap().changed);
        assert_eq!(slot.calls(), vec!["delete"]);
    }

    #[tokio::test]
    async fn test_timeout_after_create_reports_creation() {
        let slot = Slot {
            status_after_create: "BUILD",
            ..Slot::new(None)
        };
        let err = Reconciler::new(&slot, false, wait(0))
            .reconcile(DesiredState::Present, &params(json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.taxon(), "timeout");
        assert!(err.to_string().contains("was created"));
        // No compensating delete
        assert_eq!(slot.calls(), vec!["create"]);
    }

    #[tokio::test]
    async fn test_failed_status_surfaces() {
        let slot = Slot {
            status_after_create: "ERROR",
            ..Slot::new(None)
        };
        let err = Reconciler::new(&slot, false, wait(1_000))
            .reconcile(DesiredState::Present, &params(json!({})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("status ERROR"));
    }
}
