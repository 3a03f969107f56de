//! Module registry
//!
//! Shipped modules, looked up by the name the runner invokes them as.

use super::Module;
use crate::modules::{
    dns_zone::DnsZone, rds_instance::RdsInstance, security_group::SecurityGroup,
    security_group_info::SecurityGroupInfo, vpc_peering_info::VpcPeeringInfo,
    vpc_peering_mode::VpcPeeringMode, waf_certificate::WafCertificate,
};

static MODULES: &[&dyn Module] = &[
    &RdsInstance,
    &SecurityGroup,
    &SecurityGroupInfo,
    &VpcPeeringMode,
    &VpcPeeringInfo,
    &WafCertificate,
    &DnsZone,
];

/// Find a module by name. Collection-qualified names such as
/// `opentelekomcloud.cloud.rds_instance` and an `otc_` prefix are accepted.
pub fn find_module(name: &str) -> Option<&'static dyn Module> {
    let short = name.rsplit('.').next().unwrap_or(name);
    let short = short.strip_prefix("otc_").unwrap_or(short);
    MODULES.iter().copied().find(|m| m.name() == short)
}

pub fn module_names() -> Vec<&'static str> {
    MODULES.iter().map(|m| m.name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgumentSpec;

    #[test]
    fn test_lookup_forms() {
        assert_eq!(find_module("rds_instance").map(|m| m.name()), Some("rds_instance"));
        assert_eq!(
            find_module("opentelekomcloud.cloud.vpc_peering_mode").map(|m| m.name()),
            Some("vpc_peering_mode")
        );
        assert_eq!(find_module("otc_dns_zone").map(|m| m.name()), Some("dns_zone"));
        assert!(find_module("compute_instance").is_none());
    }

    #[test]
    fn test_names_unique() {
        let mut names = module_names();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_every_spec_composes_with_common() {
        for module in MODULES {
            let spec = ArgumentSpec::common().extend(module.argument_spec());
            // Module extensions never drop the common surface
            for name in ["cloud", "auth", "region_name", "interface", "timeout", "wait"] {
                assert!(spec.get(name).is_some(), "{} lost {}", module.name(), name);
            }
        }
    }
}
