//! Service catalog and endpoint resolution
//!
//! Every OTC service the session exposes is declared once in [`SERVICES`].
//! Endpoints come from, in order: a `<service>_endpoint_override` in the
//! cloud profile, the Keystone catalog (host taken from the catalog, path
//! from the descriptor), or the regional naming convention
//! `https://<host>.<region>.otc.t-systems.com`.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::http::ApiError;

/// Static description of one service namespace
#[derive(Debug, Clone, Copy)]
pub struct ServiceDescriptor {
    /// Namespace name on the session, e.g. `rds`
    pub name: &'static str,
    /// Keystone catalog `type` values that identify the service
    pub catalog_types: &'static [&'static str],
    /// Host prefix for the regional convention
    pub host: &'static str,
    /// Versioned base path; `{project_id}` is substituted
    pub path: &'static str,
}

pub const SERVICES: &[ServiceDescriptor] = &[
    ServiceDescriptor { name: "compute", catalog_types: &["compute"], host: "ecs", path: "/v2.1/{project_id}" },
    ServiceDescriptor { name: "network", catalog_types: &["network"], host: "vpc", path: "/v2.0" },
    ServiceDescriptor { name: "block_storage", catalog_types: &["volumev3", "block-storage"], host: "evs", path: "/v3/{project_id}" },
    ServiceDescriptor { name: "dns", catalog_types: &["dns"], host: "dns", path: "/v2" },
    ServiceDescriptor { name: "identity", catalog_types: &["identity"], host: "iam", path: "/v3" },
    ServiceDescriptor { name: "image", catalog_types: &["image"], host: "ims", path: "/v2" },
    ServiceDescriptor { name: "object_store", catalog_types: &["object-store", "object"], host: "swift", path: "/v1/AUTH_{project_id}" },
    ServiceDescriptor { name: "auto_scaling", catalog_types: &["asv1", "as"], host: "as", path: "/autoscaling-api/v1/{project_id}" },
    ServiceDescriptor { name: "rds", catalog_types: &["rdsv3", "rds"], host: "rds", path: "/v3/{project_id}" },
    ServiceDescriptor { name: "cce", catalog_types: &["ccev2.0", "cce"], host: "cce", path: "/api/v3/projects/{project_id}" },
    ServiceDescriptor { name: "vpc", catalog_types: &["vpc"], host: "vpc", path: "/v1/{project_id}" },
    ServiceDescriptor { name: "waf", catalog_types: &["waf"], host: "waf", path: "/v1/{project_id}/waf" },
    ServiceDescriptor { name: "dms", catalog_types: &["dms", "dmsv1"], host: "dms", path: "/v1.0/{project_id}" },
    ServiceDescriptor { name: "dcs", catalog_types: &["dcs", "dcsv1"], host: "dcs", path: "/v1.0/{project_id}" },
    ServiceDescriptor { name: "css", catalog_types: &["css"], host: "css", path: "/v1.0/{project_id}" },
    ServiceDescriptor { name: "dds", catalog_types: &["ddsv3", "dds"], host: "dds", path: "/v3/{project_id}" },
    ServiceDescriptor { name: "deh", catalog_types: &["deh", "dehv1"], host: "deh", path: "/v1.0/{project_id}" },
    ServiceDescriptor { name: "ces", catalog_types: &["cesv1", "ces"], host: "ces", path: "/V1.0/{project_id}" },
    ServiceDescriptor { name: "nat", catalog_types: &["nat"], host: "nat", path: "/v2.0" },
    ServiceDescriptor { name: "cbr", catalog_types: &["cbr"], host: "cbr", path: "/v3/{project_id}" },
    ServiceDescriptor { name: "sfsturbo", catalog_types: &["sfsturbo"], host: "sfs-turbo", path: "/v1/{project_id}/sfs-turbo" },
    ServiceDescriptor { name: "swr", catalog_types: &["swr"], host: "swr-api", path: "/v2" },
    ServiceDescriptor { name: "anti_ddos", catalog_types: &["antiddos", "anti_ddos"], host: "antiddos", path: "/v1/{project_id}" },
    ServiceDescriptor { name: "lts", catalog_types: &["lts"], host: "lts", path: "/v2/{project_id}" },
    ServiceDescriptor { name: "kms", catalog_types: &["kms", "kmsv1"], host: "kms", path: "/v1.0/{project_id}/kms" },
];

/// Lookup table by namespace name
fn service_map() -> &'static BTreeMap<&'static str, &'static ServiceDescriptor> {
    static MAP: OnceLock<BTreeMap<&'static str, &'static ServiceDescriptor>> = OnceLock::new();
    MAP.get_or_init(|| SERVICES.iter().map(|s| (s.name, s)).collect())
}

pub fn get_service(name: &str) -> Option<&'static ServiceDescriptor> {
    service_map().get(name).copied()
}

/// Namespace names in declaration order
pub fn service_names() -> Vec<&'static str> {
    SERVICES.iter().map(|s| s.name).collect()
}

#[derive(Debug, Clone)]
struct CatalogEndpoint {
    interface: String,
    region: Option<String>,
    url: String,
}

/// Keystone service catalog, keyed by service type
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    entries: BTreeMap<String, Vec<CatalogEndpoint>>,
}

impl ServiceCatalog {
    /// Parse the `catalog` array of a Keystone token body
    pub fn from_token(token: &Value) -> Self {
        let mut entries: BTreeMap<String, Vec<CatalogEndpoint>> = BTreeMap::new();

        let services = token.get("catalog").and_then(Value::as_array);
        for service in services.into_iter().flatten() {
            let Some(kind) = service.get("type").and_then(Value::as_str) else {
                continue;
            };
            let endpoints = service.get("endpoints").and_then(Value::as_array);
            for endpoint in endpoints.into_iter().flatten() {
                let Some(url) = endpoint.get("url").and_then(Value::as_str) else {
                    continue;
                };
                entries.entry(kind.to_string()).or_default().push(CatalogEndpoint {
                    interface: endpoint
                        .get("interface")
                        .and_then(Value::as_str)
                        .unwrap_or("public")
                        .to_string(),
                    region: endpoint
                        .get("region_id")
                        .or_else(|| endpoint.get("region"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    url: url.to_string(),
                });
            }
        }

        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Catalog URL for the first matching type, interface and region.
    /// Endpoints without a region match any region.
    pub fn lookup(&self, types: &[&str], interface: &str, region: &str) -> Option<&str> {
        types.iter().find_map(|kind| {
            self.entries.get(*kind)?.iter().find_map(|e| {
                let region_ok = e.region.as_deref().map_or(true, |r| r == region);
                (e.interface == interface && region_ok).then_some(e.url.as_str())
            })
        })
    }
}

/// Resolves base URLs for service namespaces
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    catalog: ServiceCatalog,
    overrides: BTreeMap<String, String>,
    interface: String,
    region: String,
    project_id: String,
}

impl EndpointResolver {
    pub fn new(
        catalog: ServiceCatalog,
        overrides: BTreeMap<String, String>,
        interface: &str,
        region: &str,
        project_id: &str,
    ) -> Self {
        Self {
            catalog,
            overrides,
            interface: interface.to_string(),
            region: region.to_string(),
            project_id: project_id.to_string(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Base URL of a namespace, without trailing slash
    pub fn endpoint(&self, service: &str) -> Result<String, ApiError> {
        let descriptor = get_service(service).ok_or_else(|| ApiError::MissingEndpoint(service.to_string()))?;

        if let Some(url) = self.overrides.get(service) {
            let url = url
                .replace("%(project_id)s", &self.project_id)
                .replace("$(project_id)s", &self.project_id)
                .replace("{project_id}", &self.project_id);
            return Ok(url.trim_end_matches('/').to_string());
        }

        let path = descriptor.path.replace("{project_id}", &self.project_id);

        if let Some(url) = self.catalog.lookup(descriptor.catalog_types, &self.interface, &self.region) {
            let origin = origin_of(url)?;
            return Ok(format!("{}{}", origin, path));
        }

        Ok(format!(
            "https://{}.{}.otc.t-systems.com{}",
            descriptor.host, self.region, path
        ))
    }
}

/// Scheme, host and port of a URL
fn origin_of(url: &str) -> Result<String, ApiError> {
    let parsed = url::Url::parse(url).map_err(|e| ApiError::Config(format!("invalid catalog URL {}: {}", url, e)))?;
    Ok(parsed.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token() -> Value {
        json!({
            "catalog": [
                {
                    "type": "rdsv3",
                    "endpoints": [
                        {"interface": "public", "region_id": "eu-de", "url": "https://rds.eu-de.otc.t-systems.com:443/v3/abc"},
                        {"interface": "internal", "region_id": "eu-de", "url": "https://rds.internal/v3/abc"}
                    ]
                },
                {
                    "type": "network",
                    "endpoints": [
                        {"interface": "public", "region": "eu-nl", "url": "https://vpc.eu-nl.otc.t-systems.com"}
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_registry_has_otc_namespaces() {
        for name in ["auto_scaling", "rds", "cce", "dns", "vpc", "waf", "dms", "dcs", "css", "dds", "deh",
            "ces", "nat", "cbr", "sfsturbo", "swr", "anti_ddos", "lts", "kms"]
        {
            assert!(get_service(name).is_some(), "missing {}", name);
        }
        assert!(get_service("gke").is_none());
    }

    #[test]
    fn test_catalog_origin_plus_canonical_path() {
        let resolver = EndpointResolver::new(
            ServiceCatalog::from_token(&token()),
            BTreeMap::new(),
            "public",
            "eu-de",
            "p1",
        );
        assert_eq!(resolver.endpoint("rds").unwrap(), "https://rds.eu-de.otc.t-systems.com/v3/p1");
    }

    #[test]
    fn test_interface_selection() {
        let resolver = EndpointResolver::new(
            ServiceCatalog::from_token(&token()),
            BTreeMap::new(),
            "internal",
            "eu-de",
            "p1",
        );
        assert_eq!(resolver.endpoint("rds").unwrap(), "https://rds.internal/v3/p1");
    }

    #[test]
    fn test_region_mismatch_falls_back_to_convention() {
        let resolver = EndpointResolver::new(
            ServiceCatalog::from_token(&token()),
            BTreeMap::new(),
            "public",
            "eu-de",
            "p1",
        );
        assert_eq!(resolver.endpoint("network").unwrap(), "https://vpc.eu-de.otc.t-systems.com/v2.0");
        assert_eq!(resolver.endpoint("waf").unwrap(), "https://waf.eu-de.otc.t-systems.com/v1/p1/waf");
    }

    #[test]
    fn test_override_wins() {
        let overrides = BTreeMap::from([(
            "rds".to_string(),
            "http://127.0.0.1:9000/v3/%(project_id)s/".to_string(),
        )]);
        let resolver = EndpointResolver::new(ServiceCatalog::default(), overrides, "public", "eu-de", "p1");
        assert_eq!(resolver.endpoint("rds").unwrap(), "http://127.0.0.1:9000/v3/p1");
    }

    #[test]
    fn test_unknown_service() {
        let resolver = EndpointResolver::new(ServiceCatalog::default(), BTreeMap::new(), "public", "eu-de", "p1");
        assert_eq!(
            resolver.endpoint("bigquery").unwrap_err(),
            ApiError::MissingEndpoint("bigquery".to_string())
        );
    }
}
