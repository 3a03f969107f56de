//! Session factory
//!
//! Turns validated invocation parameters into a [`Session`]. The checks that
//! need no network (minimum SDK version, overspecified inline cloud) live in
//! [`preflight`] so they run before any connector is asked for a session.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::client::OtcClient;
use super::http::HttpOptions;
use super::profile::{resolve_profile, AuthConfig, CloudConfig, CloudsFile};
use crate::args::{ArgumentSpec, ParamValue, Params};
use crate::error::{ModuleError, Result};
use crate::services::Session;

/// Version of this harness, compared against module minimums
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parameters that may not accompany an inline `cloud` mapping
pub const INLINE_FORBIDDEN: &[&str] = &[
    "auth",
    "region_name",
    "validate_certs",
    "ca_cert",
    "client_key",
    "api_timeout",
    "auth_type",
    "interface",
];

/// Produces the session for one invocation
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &Params) -> Result<Session>;
}

/// Checks that must fail before any remote call
pub fn preflight(
    spec: &ArgumentSpec,
    params: &Params,
    min_sdk_version: Option<&str>,
    sdk_version: &str,
) -> Result<()> {
    if let Some(required) = min_sdk_version {
        if compare_versions(sdk_version, required).is_lt() {
            return Err(ModuleError::precondition(format!(
                "module requires SDK version {} or newer, installed version is {}",
                required, sdk_version
            )));
        }
    }

    if params.get("cloud").is_some_and(Value::is_object) {
        let offending: Vec<&str> = INLINE_FORBIDDEN
            .iter()
            .copied()
            .filter(|name| {
                let default = spec.get(name).map(|s| s.default_value()).unwrap_or(Value::Null);
                params.param(name).is_some_and(|v| differs_from_default(v, &default))
            })
            .collect();

        if !offending.is_empty() {
            return Err(ModuleError::invalid(format!(
                "an inline cloud configuration cannot be combined with: {}",
                offending.join(", ")
            )));
        }
    }

    Ok(())
}

fn differs_from_default(value: &ParamValue, default: &Value) -> bool {
    let value = match value {
        ParamValue::Plain(v) => v,
        ParamValue::Secret(s) => s.expose(),
    };
    !value.is_null() && value != default
}

/// Compare dotted versions numerically; missing components count as zero
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    fn parts(v: &str) -> Vec<u64> {
        v.split('.')
            .map(|p| {
                p.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    }

    let (a, b) = (parts(a), parts(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let ord = a.get(i).copied().unwrap_or(0).cmp(&b.get(i).copied().unwrap_or(0));
        if ord.is_ne() {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

/// Connector that talks to OTC over HTTPS
#[derive(Debug, Clone, Default)]
pub struct OtcConnector {
    clouds_file: Option<PathBuf>,
}

impl OtcConnector {
    pub fn new(clouds_file: Option<PathBuf>) -> Self {
        Self { clouds_file }
    }

    /// Profile plus invocation overrides
    pub fn cloud_config(&self, params: &Params) -> anyhow::Result<CloudConfig> {
        let env = |key: &str| std::env::var(key).ok();

        if let Some(inline) = params.get("cloud").filter(|v| v.is_object()) {
            return CloudConfig::from_inline(inline);
        }

        let clouds = CloudsFile::load(self.clouds_file.as_deref(), &env)?;
        let mut config = resolve_profile(params.get_str("cloud"), &clouds, &env)?;
        apply_overrides(&mut config, params)?;
        Ok(config)
    }
}

fn apply_overrides(config: &mut CloudConfig, params: &Params) -> anyhow::Result<()> {
    if let Some(auth) = params.secret("auth") {
        let overlay: AuthConfig = serde_json::from_value(auth.expose().clone())
            .map_err(|e| anyhow::anyhow!("invalid auth mapping: {}", e))?;
        config.auth.overlay(overlay);
    }
    if let Some(v) = params.get_str("auth_type") {
        config.auth_type = Some(v.to_string());
    }
    if let Some(v) = params.get_str("region_name") {
        config.region_name = Some(v.to_string());
    }
    if params.is_explicit("interface") {
        if let Some(v) = params.get_str("interface") {
            config.interface = Some(v.to_string());
        }
    }
    if let Some(v) = params.get_bool("validate_certs") {
        config.verify = Some(v);
    }
    if let Some(v) = params.get_str("ca_cert") {
        config.cacert = Some(PathBuf::from(v));
    }
    if let Some(v) = params.get_str("client_cert") {
        config.cert = Some(PathBuf::from(v));
    }
    if let Some(v) = params.secret("client_key").and_then(|s| s.expose().as_str()) {
        config.key = Some(PathBuf::from(v));
    }
    if let Some(v) = params.get_i64("api_timeout") {
        config.api_timeout = u64::try_from(v).ok();
    }
    Ok(())
}

fn http_options(config: &CloudConfig) -> HttpOptions {
    HttpOptions {
        verify: config.verify.unwrap_or(true),
        ca_cert: config.cacert.clone(),
        client_cert: config.cert.clone(),
        client_key: config.key.clone(),
        timeout: config.api_timeout.filter(|t| *t > 0).map(Duration::from_secs),
    }
}

#[async_trait]
impl Connector for OtcConnector {
    async fn connect(&self, params: &Params) -> Result<Session> {
        let config = self
            .cloud_config(params)
            .map_err(|e| ModuleError::connectivity(format!("cloud configuration: {:#}", e)))?;

        let client = OtcClient::connect(&config, &http_options(&config))
            .await
            .map_err(|e| ModuleError::connectivity(format!("failed to connect to cloud: {}", e)))?;

        let region = client.region().to_string();
        let project_id = client.project_id().to_string();
        Ok(Session::from_backend(Arc::new(client), &region, &project_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgumentSpec;
    use serde_json::json;
    use std::cmp::Ordering;

    fn validate(args: Value) -> Params {
        ArgumentSpec::common()
            .validate(args.as_object().unwrap())
            .unwrap()
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("0.12.0", "0.9.1"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("0.3.0", "0.10.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0-rc1", "2.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_min_sdk_version_names_both() {
        let params = validate(json!({}));
        let err = preflight(&ArgumentSpec::common(), &params, Some("99.0.0"), "0.3.0").unwrap_err();
        assert_eq!(err.taxon(), "precondition-failed");
        assert!(err.to_string().contains("99.0.0"));
        assert!(err.to_string().contains("0.3.0"));
    }

    #[test]
    fn test_inline_cloud_with_region_rejected() {
        let params = validate(json!({
            "cloud": {"auth_url": "https://iam.example/v3", "username": "u", "password": "p", "project_name": "x"},
            "region_name": "eu-de"
        }));
        let err = preflight(&ArgumentSpec::common(), &params, None, SDK_VERSION).unwrap_err();
        assert_eq!(err.taxon(), "invalid-arguments");
        assert!(err.to_string().contains("region_name"));
    }

    #[test]
    fn test_inline_cloud_with_defaults_accepted() {
        let params = validate(json!({
            "cloud": {"auth_url": "https://iam.example/v3"},
            "interface": "public",
            "wait": false
        }));
        assert!(preflight(&ArgumentSpec::common(), &params, None, SDK_VERSION).is_ok());
    }

    #[test]
    fn test_named_profile_accepts_overrides() {
        let params = validate(json!({"cloud": "otc", "region_name": "eu-nl", "interface": "internal"}));
        assert!(preflight(&ArgumentSpec::common(), &params, None, SDK_VERSION).is_ok());
    }

    #[test]
    fn test_secret_override_listed_without_value() {
        let params = validate(json!({
            "cloud": {"auth_url": "https://iam.example/v3"},
            "auth": {"password": "top-secret"}
        }));
        let err = preflight(&ArgumentSpec::common(), &params, None, SDK_VERSION).unwrap_err();
        assert!(err.to_string().contains("auth"));
        assert!(!err.to_string().contains("top-secret"));
    }

    #[test]
    fn test_overrides_applied_to_profile() {
        let params = validate(json!({
            "cloud": "otc",
            "region_name": "eu-nl",
            "validate_certs": "no",
            "api_timeout": 30,
            "auth": {"password": "override"}
        }));
        let mut config = CloudConfig::default();
        apply_overrides(&mut config, &params).unwrap();
        assert_eq!(config.region(), "eu-nl");
        assert_eq!(config.verify, Some(false));
        assert_eq!(config.auth.password.as_ref().unwrap().expose(), "override");

        let options = http_options(&config);
        assert!(!options.verify);
        assert_eq!(options.timeout, Some(Duration::from_secs(30)));
    }
}
