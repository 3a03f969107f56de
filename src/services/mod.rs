//! Typed service namespaces
//!
//! One trait per OTC service a module may call into. The session handle
//! composes them; each resource adapter depends only on the trait it uses,
//! so tests can substitute an in-memory backend.
//!
//! # Module Structure
//!
//! - [`network`] - security groups and networks (Neutron v2.0)
//! - [`vpc`] - routers (VPC v1) and peerings
//! - [`rds`] - RDS v3 instances
//! - [`waf`] - WAF certificates
//! - [`dns`] - DNS zones

pub mod dns;
pub mod network;
pub mod rds;
pub mod vpc;
pub mod waf;

use std::fmt;
use std::sync::Arc;

pub use dns::DnsApi;
pub use network::NetworkApi;
pub use rds::RdsApi;
pub use vpc::VpcApi;
pub use waf::WafApi;

/// Authenticated, region-bound handle for one invocation
#[derive(Clone)]
pub struct Session {
    pub network: Arc<dyn NetworkApi>,
    pub vpc: Arc<dyn VpcApi>,
    pub rds: Arc<dyn RdsApi>,
    pub waf: Arc<dyn WafApi>,
    pub dns: Arc<dyn DnsApi>,
    region: String,
    project_id: String,
}

impl Session {
    /// Session whose namespaces are all served by one backend
    pub fn from_backend<B>(backend: Arc<B>, region: &str, project_id: &str) -> Self
    where
        B: NetworkApi + VpcApi + RdsApi + WafApi + DnsApi + 'static,
    {
        Self {
            network: backend.clone(),
            vpc: backend.clone(),
            rds: backend.clone(),
            waf: backend.clone(),
            dns: backend,
            region: region.to_string(),
            project_id: project_id.to_string(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("region", &self.region)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

/// Owned query pairs from borrowed ones
pub(crate) fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
