//! Error taxonomy
//!
//! Every failure a module can report is one of the variants of
//! [`ModuleError`]. The envelope `msg` is the `Display` form, which always
//! starts with the taxon name so the runner (and humans) can classify it.

use thiserror::Error;

use crate::otc::http::ApiError;

/// Classified module failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// Schema violations, unknown keys, cross-parameter conflicts,
    /// overspecified cloud configuration.
    #[error("invalid-arguments: {0}")]
    InvalidArguments(String),

    /// Minimum SDK not satisfied, or a related resource needed for
    /// attribute resolution does not exist.
    #[error("precondition-failed: {0}")]
    PreconditionFailed(String),

    /// A resource referenced by identity could not be located.
    #[error("not-found: {0}")]
    NotFound(String),

    /// Drift on a non-updatable attribute.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any underlying remote error, reason included verbatim.
    #[error("connectivity: {0}")]
    Connectivity(String),

    /// A wait did not observe the terminal state in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Harness invariant violation. Always a bug.
    #[error("internal: {0}")]
    Internal(String),
}

impl ModuleError {
    /// Stable taxon name, also the `msg` prefix.
    pub fn taxon(&self) -> &'static str {
        match self {
            Self::InvalidArguments(_) => "invalid-arguments",
            Self::PreconditionFailed(_) => "precondition-failed",
            Self::NotFound(_) => "not-found",
            Self::Conflict(_) => "conflict",
            Self::Connectivity(_) => "connectivity",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Reason without the taxon prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::InvalidArguments(m)
            | Self::PreconditionFailed(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Connectivity(m)
            | Self::Timeout(m)
            | Self::Internal(m) => m,
        }
    }

    /// Rewrites the reason, keeping the taxon. Used to scrub secrets.
    pub fn map_reason(self, f: impl FnOnce(&str) -> String) -> Self {
        let reason = f(self.reason());
        match self {
            Self::InvalidArguments(_) => Self::InvalidArguments(reason),
            Self::PreconditionFailed(_) => Self::PreconditionFailed(reason),
            Self::NotFound(_) => Self::NotFound(reason),
            Self::Conflict(_) => Self::Conflict(reason),
            Self::Connectivity(_) => Self::Connectivity(reason),
            Self::Timeout(_) => Self::Timeout(reason),
            Self::Internal(_) => Self::Internal(reason),
        }
    }
}

impl From<ApiError> for ModuleError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Duplicate { .. } => Self::PreconditionFailed(err.to_string()),
            other => Self::Connectivity(other.to_string()),
        }
    }
}

pub type Result<T, E = ModuleError> = std::result::Result<T, E>;
