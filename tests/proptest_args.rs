//! Property-based tests using proptest
//!
//! These tests verify argument validation, drift detection and secret
//! redaction over randomized inputs.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use otcmod::args::{ArgSpec, ArgumentSpec, Redactor, Sensitive, REDACTED};
use otcmod::module::{find_module, module_names, Harness};
use otcmod::reconcile::{Attribute, Compare, Diff};
use otcmod::testing::{FakeCloud, StaticConnector, Store};

/// Scalar JSON values of every type
fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ._-]{0,12}".prop_map(Value::String),
        prop::collection::vec("[a-z]{1,5}", 0..3).prop_map(|v| json!(v)),
    ]
}

/// Argument mappings mixing declared names with unknown keys
fn arb_args(names: Vec<String>) -> impl Strategy<Value = Map<String, Value>> {
    let key = prop_oneof![
        4 => prop::sample::select(names),
        1 => "[a-z_]{1,10}",
    ];
    prop::collection::btree_map(key, arb_scalar(), 0..8).prop_map(|m| m.into_iter().collect())
}

/// Declared names across the shipped modules plus the common surface
const CANDIDATE_NAMES: &[&str] = &[
    "cloud", "region_name", "interface", "wait", "timeout", "auth", "name", "state",
    "description", "mode", "status", "router", "network", "flavor", "volume_size",
    "password", "private_key", "content", "zone_type", "ttl", "email",
];

fn module_spec(name: &str) -> ArgumentSpec {
    let module = find_module(name).unwrap();
    ArgumentSpec::common().extend(module.argument_spec())
}

fn arb_invocation() -> impl Strategy<Value = (&'static str, Map<String, Value>)> {
    let names: Vec<String> = CANDIDATE_NAMES.iter().map(|s| s.to_string()).collect();
    (prop::sample::select(module_names()), arb_args(names))
}

proptest! {
    /// Every input either validates or is rejected as invalid-arguments
    #[test]
    fn prop_schema_is_total((module, args) in arb_invocation()) {
        let spec = module_spec(module);

        match spec.validate(&args) {
            Ok(params) => {
                // Nothing undeclared slips through
                for name in params.names() {
                    prop_assert!(spec.get(name).is_some(), "{} passed undeclared {}", module, name);
                }
                for key in args.keys() {
                    prop_assert!(spec.canonical_name(key).is_some(), "{} accepted unknown {}", module, key);
                }
            }
            Err(e) => prop_assert_eq!(e.taxon(), "invalid-arguments"),
        }
    }

    /// Formatting a sensitive value never shows it
    #[test]
    fn prop_sensitive_never_formats(secret in ".{1,40}") {
        let wrapped = Sensitive::new(secret.clone());
        prop_assert_eq!(format!("{}", wrapped), REDACTED);
        prop_assert_eq!(format!("{:?}", wrapped), REDACTED);
        prop_assert_eq!(serde_json::to_value(&wrapped).unwrap(), json!(REDACTED));
    }

    /// Scrubbed text never contains a registered secret
    #[test]
    fn prop_redactor_scrubs(
        secret in "s3-[a-z0-9]{6,16}",
        before in "[a-z :]{0,20}",
        after in "[a-z :]{0,20}",
        repeats in 1usize..4,
    ) {
        let mut redactor = Redactor::new();
        redactor.add(&secret);

        let text = format!("{}{}{}", before, secret.repeat(repeats), after);
        let scrubbed = redactor.scrub_str(&text);
        prop_assert!(!scrubbed.contains(&secret));
        prop_assert!(scrubbed.contains(REDACTED));

        let mut doc = json!({"msg": text, "nested": [{"value": secret.clone()}]});
        redactor.scrub_value(&mut doc);
        prop_assert!(!doc.to_string().contains(&secret));
    }

    /// Omitted parameters never count as drift
    #[test]
    fn prop_drift_only_on_declared(
        remote_size in 1i64..1000,
        remote_flavor in "[a-z0-9.]{1,12}",
        supply_size in any::<bool>(),
        desired_size in 1i64..1000,
    ) {
        const ATTRS: &[Attribute] = &[
            Attribute::scalar("volume_size", "volume.size"),
            Attribute::new("flavor", "flavor_ref", Compare::CaseInsensitive),
        ];
        let spec = ArgumentSpec::new()
            .param("volume_size", ArgSpec::int())
            .param("flavor", ArgSpec::str().default("s1.medium"));

        let mut args = Map::new();
        if supply_size {
            args.insert("volume_size".to_string(), json!(desired_size));
        }
        let params = spec.validate(&args).unwrap();
        let remote = json!({"volume": {"size": remote_size}, "flavor_ref": remote_flavor});

        let diff = Diff::compute(ATTRS, &params, &remote, false);
        prop_assert!(!diff.contains("flavor"), "defaulted flavor drifted");
        prop_assert_eq!(diff.contains("volume_size"), supply_size && desired_size != remote_size);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The RDS password appears nowhere in the envelope, success or failure
    #[test]
    fn prop_password_never_leaks(
        password in "pw-[A-Za-z0-9!#%+]{8,24}",
        router_exists in any::<bool>(),
        check_mode in any::<bool>(),
    ) {
        let mut cloud = FakeCloud::new()
            .seed(Store::Networks, json!({"name": "net-a"}))
            .seed(Store::SecurityGroups, json!({"name": "default"}));
        if router_exists {
            cloud = cloud.with_router("router-a");
        }
        let cloud = Arc::new(cloud);

        let payload = json!({
            "name": "rds1",
            "datastore_type": "mysql",
            "datastore_version": "8.0",
            "flavor": "rds.mysql.c3.15xlarge.2.ha",
            "router": "router-a",
            "network": "net-a",
            "security_group": "default",
            "volume_size": 100,
            "password": password.as_str(),
            "availability_zone": "eu-de-01",
            "_ansible_check_mode": check_mode,
            "_ansible_diff": true
        });

        let envelope = tokio_test::block_on(async {
            Harness::new(StaticConnector::new(cloud.session()))
                .with_poll_interval(Duration::from_millis(1))
                .invoke(find_module("rds_instance").unwrap(), &payload)
                .await
        });

        prop_assert_eq!(envelope.failed, !router_exists);
        let serialized = serde_json::to_string(&envelope).unwrap();
        prop_assert!(!serialized.contains(&password), "leaked in {}", serialized);
    }
}
