//! Open Telekom Cloud automation modules
//!
//! A harness that runs declarative modules against OTC: it validates the
//! caller's arguments, builds an authenticated session, reconciles the
//! desired state of one resource and reports a single result envelope.
//!
//! # Module Structure
//!
//! - [`args`] - argument schema, validation, secret handling
//! - [`otc`] - authentication, endpoint resolution, REST client, session factory
//! - [`services`] - typed service namespaces behind the session
//! - [`reconcile`] - drift, present/absent state machine, waiting
//! - [`envelope`] - module outcome and the result envelope
//! - [`module`] - module contract, registry, harness
//! - [`modules`] - shipped modules
//! - [`testing`] - in-memory cloud for tests

pub mod args;
pub mod config;
pub mod envelope;
pub mod error;
pub mod module;
pub mod modules;
pub mod otc;
pub mod reconcile;
pub mod services;
pub mod testing;
