//! Cloud profiles
//!
//! Resolves the cloud configuration for a session from one of three
//! sources: an inline mapping passed as `cloud`, a named profile in
//! clouds.yaml (with secure.yaml merged over it), or the `OS_*`
//! environment variables.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::args::Sensitive;

/// Region used when neither the profile nor the invocation names one
pub const DEFAULT_REGION: &str = "eu-de";

/// Name of the profile synthesised from `OS_*` environment variables
pub const ENVVARS_PROFILE: &str = "envvars";

/// Keys of a flat inline mapping that belong under `auth`
const AUTH_KEYS: &[&str] = &[
    "auth_url",
    "username",
    "user_id",
    "password",
    "token",
    "project_name",
    "project_id",
    "user_domain_name",
    "user_domain_id",
    "project_domain_name",
    "project_domain_id",
    "domain_name",
    "domain_id",
];

/// Keystone credentials
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    pub auth_url: Option<String>,
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub password: Option<Sensitive<String>>,
    pub token: Option<Sensitive<String>>,
    pub project_name: Option<String>,
    pub project_id: Option<String>,
    pub user_domain_name: Option<String>,
    pub user_domain_id: Option<String>,
    pub project_domain_name: Option<String>,
    pub project_domain_id: Option<String>,
    pub domain_name: Option<String>,
    pub domain_id: Option<String>,
}

impl AuthConfig {
    /// Fields set in `other` replace ours
    pub fn overlay(&mut self, other: AuthConfig) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            auth_url,
            username,
            user_id,
            password,
            token,
            project_name,
            project_id,
            user_domain_name,
            user_domain_id,
            project_domain_name,
            project_domain_id,
            domain_name,
            domain_id
        );
    }
}

/// One cloud entry of clouds.yaml, or an inline `cloud` mapping
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    pub auth_type: Option<String>,
    pub region_name: Option<String>,
    pub interface: Option<String>,
    pub verify: Option<bool>,
    pub cacert: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub api_timeout: Option<u64>,
    /// Everything else, e.g. `rds_endpoint_override`
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CloudConfig {
    /// Parse an inline `cloud` mapping. Auth fields may be given flat at
    /// the top level; they are moved under `auth`.
    pub fn from_inline(value: &Value) -> Result<Self> {
        let mut map = value
            .as_object()
            .cloned()
            .context("inline cloud configuration must be a mapping")?;

        let mut auth = map
            .remove("auth")
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        for key in AUTH_KEYS {
            if let Some(v) = map.remove(*key) {
                auth.entry(key.to_string()).or_insert(v);
            }
        }
        map.insert("auth".to_string(), Value::Object(auth));

        serde_json::from_value(Value::Object(map)).context("invalid inline cloud configuration")
    }

    /// Profile built from `OS_*` environment variables, if `OS_AUTH_URL`
    /// is set.
    pub fn from_env(env: &dyn Fn(&str) -> Option<String>) -> Option<Self> {
        let auth_url = env("OS_AUTH_URL")?;
        let auth = AuthConfig {
            auth_url: Some(auth_url),
            username: env("OS_USERNAME"),
            user_id: env("OS_USER_ID"),
            password: env("OS_PASSWORD").map(Sensitive::new),
            token: env("OS_TOKEN").map(Sensitive::new),
            project_name: env("OS_PROJECT_NAME").or_else(|| env("OS_TENANT_NAME")),
            project_id: env("OS_PROJECT_ID").or_else(|| env("OS_TENANT_ID")),
            user_domain_name: env("OS_USER_DOMAIN_NAME"),
            user_domain_id: env("OS_USER_DOMAIN_ID"),
            project_domain_name: env("OS_PROJECT_DOMAIN_NAME"),
            project_domain_id: env("OS_PROJECT_DOMAIN_ID"),
            domain_name: env("OS_DOMAIN_NAME"),
            domain_id: env("OS_DOMAIN_ID"),
        };
        Some(Self {
            auth,
            auth_type: env("OS_AUTH_TYPE"),
            region_name: env("OS_REGION_NAME"),
            interface: env("OS_INTERFACE"),
            cacert: env("OS_CACERT").map(PathBuf::from),
            cert: env("OS_CERT").map(PathBuf::from),
            key: env("OS_KEY").map(PathBuf::from),
            ..Self::default()
        })
    }

    pub fn region(&self) -> &str {
        self.region_name.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or("public")
    }

    /// `<service>_endpoint_override` entries
    pub fn endpoint_overrides(&self) -> BTreeMap<String, String> {
        self.extra
            .iter()
            .filter_map(|(k, v)| {
                let service = k.strip_suffix("_endpoint_override")?;
                Some((service.to_string(), v.as_str()?.to_string()))
            })
            .collect()
    }
}

/// Parsed clouds.yaml (secure.yaml already merged)
#[derive(Debug, Clone, Default)]
pub struct CloudsFile {
    clouds: BTreeMap<String, Value>,
}

impl CloudsFile {
    /// Parse clouds.yaml text, optionally deep-merging secure.yaml text
    pub fn parse(clouds_yaml: &str, secure_yaml: Option<&str>) -> Result<Self> {
        let mut root: Value = serde_yaml::from_str(clouds_yaml).context("Failed to parse clouds.yaml")?;
        if let Some(secure) = secure_yaml {
            let secure: Value = serde_yaml::from_str(secure).context("Failed to parse secure.yaml")?;
            merge(&mut root, secure);
        }

        let clouds = root
            .get("clouds")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Ok(Self { clouds })
    }

    /// Load from the standard search path. A missing file yields an empty
    /// set of profiles.
    pub fn load(explicit: Option<&Path>, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let Some(path) = find_config_file("clouds.yaml", explicit, env("OS_CLIENT_CONFIG_FILE")) else {
            tracing::debug!("No clouds.yaml found");
            return Ok(Self::default());
        };
        tracing::debug!("Using clouds file {:?}", path);

        let clouds = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let secure = path
            .parent()
            .map(|dir| dir.join("secure.yaml"))
            .filter(|p| p.exists())
            .map(|p| std::fs::read_to_string(&p).with_context(|| format!("Failed to read {}", p.display())))
            .transpose()?;

        Self::parse(&clouds, secure.as_deref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.clouds.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<Result<CloudConfig>> {
        self.clouds.get(name).map(|v| {
            serde_json::from_value(v.clone()).with_context(|| format!("invalid cloud profile '{}'", name))
        })
    }
}

/// Pick the profile: explicit name, then `OS_CLOUD`, then the environment
/// profile, then the only entry of clouds.yaml.
pub fn resolve_profile(
    name: Option<&str>,
    clouds: &CloudsFile,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<CloudConfig> {
    let selected = name.map(str::to_string).or_else(|| env("OS_CLOUD"));

    match selected.as_deref() {
        Some(ENVVARS_PROFILE) => CloudConfig::from_env(env).context("OS_AUTH_URL is not set"),
        Some(name) => clouds.get(name).unwrap_or_else(|| {
            Err(anyhow::anyhow!(
                "cloud profile '{}' not found (known profiles: {})",
                name,
                clouds.names().join(", ")
            ))
        }),
        None => {
            if let Some(config) = CloudConfig::from_env(env) {
                return Ok(config);
            }
            match clouds.names().as_slice() {
                [only] => clouds
                    .get(only)
                    .unwrap_or_else(|| Err(anyhow::anyhow!("cloud profile '{}' vanished", only))),
                _ => Err(anyhow::anyhow!(
                    "no cloud selected: pass 'cloud', set OS_CLOUD, or set OS_AUTH_URL"
                )),
            }
        }
    }
}

/// Deep merge `overlay` into `base`
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (k, v) in overlay {
                merge(base.entry(k).or_insert(Value::Null), v);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Search order: explicit path, `OS_CLIENT_CONFIG_FILE`, current directory,
/// user config directory, system directory
fn find_config_file(name: &str, explicit: Option<&Path>, from_env: Option<String>) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    if let Some(path) = from_env {
        candidates.push(PathBuf::from(path));
    }
    candidates.push(PathBuf::from(name));
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("openstack").join(name));
    }
    candidates.push(PathBuf::from("/etc/openstack").join(name));

    candidates.into_iter().find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CLOUDS: &str = r#"
clouds:
  otc:
    auth:
      auth_url: https://iam.eu-de.otc.t-systems.com/v3
      username: robot
      project_name: eu-de_demo
      user_domain_name: OTC00000000001000000001
    region_name: eu-de
    rds_endpoint_override: https://rds.example.test/v3/%(project_id)s
  other:
    auth:
      auth_url: https://iam.eu-nl.otc.t-systems.com/v3
    region_name: eu-nl
"#;

    const SECURE: &str = r#"
clouds:
  otc:
    auth:
      password: from-secure-yaml
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_secure_yaml_merged() {
        let clouds = CloudsFile::parse(CLOUDS, Some(SECURE)).unwrap();
        let otc = clouds.get("otc").unwrap().unwrap();
        assert_eq!(otc.auth.username.as_deref(), Some("robot"));
        assert_eq!(otc.auth.password.as_ref().unwrap().expose(), "from-secure-yaml");
        assert_eq!(otc.region(), "eu-de");
        assert_eq!(
            otc.endpoint_overrides().get("rds").map(String::as_str),
            Some("https://rds.example.test/v3/%(project_id)s")
        );
    }

    #[test]
    fn test_resolve_named_profile() {
        let clouds = CloudsFile::parse(CLOUDS, None).unwrap();
        let config = resolve_profile(Some("other"), &clouds, &no_env).unwrap();
        assert_eq!(config.region(), "eu-nl");
    }

    #[test]
    fn test_unknown_profile_lists_known() {
        let clouds = CloudsFile::parse(CLOUDS, None).unwrap();
        let err = resolve_profile(Some("missing"), &clouds, &no_env).unwrap_err();
        assert!(err.to_string().contains("known profiles: otc, other"));
    }

    #[test]
    fn test_env_profile() {
        let env = |key: &str| match key {
            "OS_AUTH_URL" => Some("https://iam.example/v3".to_string()),
            "OS_USERNAME" => Some("env-user".to_string()),
            "OS_PASSWORD" => Some("env-pass".to_string()),
            "OS_REGION_NAME" => Some("eu-ch2".to_string()),
            _ => None,
        };
        let config = resolve_profile(None, &CloudsFile::default(), &env).unwrap();
        assert_eq!(config.auth.username.as_deref(), Some("env-user"));
        assert_eq!(config.region(), "eu-ch2");
    }

    #[test]
    fn test_os_cloud_selects_profile() {
        let clouds = CloudsFile::parse(CLOUDS, None).unwrap();
        let env = |key: &str| (key == "OS_CLOUD").then(|| "otc".to_string());
        let config = resolve_profile(None, &clouds, &env).unwrap();
        assert_eq!(config.auth.username.as_deref(), Some("robot"));
    }

    #[test]
    fn test_inline_flat_auth_keys() {
        let config = CloudConfig::from_inline(&json!({
            "auth_url": "https://iam.eu-de.otc.t-systems.com/v3",
            "username": "robot",
            "password": "inline-secret",
            "project_name": "eu-de",
            "region_name": "eu-de"
        }))
        .unwrap();
        assert_eq!(config.auth.project_name.as_deref(), Some("eu-de"));
        assert_eq!(config.auth.password.as_ref().unwrap().expose(), "inline-secret");
        assert!(!format!("{:?}", config).contains("inline-secret"));
    }

    #[test]
    fn test_default_region() {
        assert_eq!(CloudConfig::default().region(), DEFAULT_REGION);
        assert_eq!(CloudConfig::default().interface(), "public");
    }
}
