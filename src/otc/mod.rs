//! OTC API interaction module
//!
//! Authentication, endpoint resolution and the REST client that backs a
//! live [`Session`](crate::services::Session).
//!
//! # Module Structure
//!
//! - [`auth`] - Keystone v3 token issue and caching
//! - [`catalog`] - service registry and endpoint resolution
//! - [`client`] - authenticated client, lazy pagination, name-or-id lookup
//! - [`http`] - HTTP utilities for REST API calls
//! - [`profile`] - clouds.yaml, secure.yaml and `OS_*` profiles
//! - [`session`] - session factory and preflight checks

pub mod auth;
pub mod catalog;
pub mod client;
pub mod http;
pub mod profile;
pub mod session;

pub use session::{Connector, OtcConnector, SDK_VERSION};
