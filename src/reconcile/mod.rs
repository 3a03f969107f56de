//! Reconciliation engine
//!
//! - [`drift`] - attribute bindings and semantic comparison
//! - [`engine`] - plan/apply state machine over a [`ResourceAdapter`]
//! - [`wait`] - deadline-bounded polling

pub mod drift;
pub mod engine;
pub mod wait;

pub use drift::{Attribute, Compare, Diff};
pub use engine::{DesiredState, Readiness, Reconciled, Reconciler, ResourceAdapter, Transition};
pub use wait::WaitPolicy;
