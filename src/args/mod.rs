//! Module arguments
//!
//! Declarative argument specs, the validator that turns a raw JSON mapping
//! into [`Params`], and the sensitive-value wrapper used for everything
//! marked no-log.
//!
//! # Module Structure
//!
//! - [`spec`] - [`ArgSpec`] descriptors and the cross-parameter matrix
//! - [`validate`] - validation and type coercion
//! - [`params`] - validated parameter record
//! - [`sensitive`] - [`Sensitive`] wrapper and [`Redactor`]

pub mod params;
pub mod sensitive;
pub mod spec;
pub mod validate;

pub use params::{ParamValue, Params};
pub use sensitive::{Redactor, Sensitive, REDACTED};
pub use spec::{ArgSpec, ArgumentSpec, Kind, RequiredIf};
