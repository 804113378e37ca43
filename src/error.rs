//! Error types for TKR resolution
//!
//! Errors are structured with fields so that admission denials carry enough
//! context for a user to fix their cluster: the variable that was missing,
//! the version constraint that matched nothing, or the machine template
//! whose OS requirements no OSImage satisfies.

use thiserror::Error;

/// Main error type for resolution operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A version string could not be parsed
    ///
    /// Catalog entries with malformed versions are skipped, so this error
    /// only surfaces from direct calls into the version module.
    #[error("malformed version '{version}': {reason}")]
    MalformedVersion {
        /// The offending version string
        version: String,
        /// What was wrong with it
        reason: String,
    },

    /// A required topology variable (or the topology version) is absent
    #[error("missing required variable '{name}'")]
    MissingVariable {
        /// Variable name (or field path for non-variable inputs)
        name: String,
    },

    /// A topology variable violates the ClusterClass schema
    #[error("invalid variable '{name}': {message}")]
    InvalidVariable {
        /// Variable name (or field path for non-variable inputs)
        name: String,
        /// Description of the violation
        message: String,
    },

    /// No TKR in the catalog satisfies the requested version
    #[error(
        "no compatible TKR for version '{constraint}' (nearest available: {})",
        format_nearest(nearest)
    )]
    NoCompatibleTkr {
        /// The requested version constraint
        constraint: String,
        /// Closest versions present in the catalog, newest first
        nearest: Vec<String>,
    },

    /// The chosen TKR has no OSImage for one of the machine templates
    #[error("no compatible OSImage for TKR '{tkr}' in machine template '{template}' ({requirements})")]
    NoCompatibleOsImage {
        /// Name of the chosen TKR
        tkr: String,
        /// Machine template that could not be satisfied
        template: String,
        /// Human readable OS requirements of the template
        requirements: String,
    },

    /// Kubernetes API error from the ClusterClass lookup at admission
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The admission patch could not be serialized
    #[error("serialization error: {0}")]
    Serialization(String),
}

fn format_nearest(nearest: &[String]) -> String {
    if nearest.is_empty() {
        "none".to_string()
    } else {
        nearest.join(", ")
    }
}

impl Error {
    /// Create a malformed version error
    pub fn malformed_version(version: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedVersion {
            version: version.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing variable error
    pub fn missing_variable(name: impl Into<String>) -> Self {
        Self::MissingVariable { name: name.into() }
    }

    /// Create an invalid variable error
    pub fn invalid_variable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidVariable {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Returns true if the error is caused by the cluster's own inputs
    ///
    /// These errors will not go away on retry until the cluster (or the
    /// catalog) changes. The webhook denies them plainly and reports
    /// everything else as an internal failure.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::MissingVariable { .. }
                | Self::InvalidVariable { .. }
                | Self::NoCompatibleTkr { .. }
                | Self::NoCompatibleOsImage { .. }
        )
    }
}
