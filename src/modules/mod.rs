//! Shipped modules
//!
//! Stateful modules implement a resource adapter and hand it to
//! [`crate::module::run_stateful`]; `_info` modules list through the
//! session and filter client-side; `vpc_peering_mode` drives a one-way
//! status transition.

pub mod dns_zone;
pub mod rds_instance;
pub mod security_group;
pub mod security_group_info;
pub mod vpc_peering_info;
pub mod vpc_peering_mode;
pub mod waf_certificate;
