//! Storage Errors
//!
//! `TigerStyle`: Explicit error types with context.
//!
//! Every variant is caught at the service boundary and turned into a
//! zero/empty result plus a log line; none of them reaches a caller of
//! [`LogService`](crate::service::LogService).

use thiserror::Error;

/// Errors from backend operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The project has no physical store yet
    #[error("not provisioned: {target}")]
    NotProvisioned {
        /// Index alias or table that does not exist
        target: String,
    },

    /// One step of lazy provisioning failed
    #[error("provisioning failed at {step}: {message}")]
    ProvisioningFailure {
        /// Step that failed (policy, template, segment, extension, table, indexes)
        step: &'static str,
        /// Underlying failure
        message: String,
    },

    /// Retention update requested for a project without a policy
    #[error("retention policy not found: {policy}")]
    PolicyNotFound {
        /// Policy (or table) name that was looked up
        policy: String,
    },

    /// Transport failure after the connection layer gave up
    #[error("backend unreachable: {message}")]
    BackendUnreachable {
        /// Transport error message
        message: String,
    },

    /// Round-trip exceeded the configured timeout
    #[error("timeout after {duration_ms}ms")]
    Timeout {
        /// Duration in milliseconds
        duration_ms: u64,
    },

    /// Some items of a bulk write were rejected
    #[error("bulk write partially failed: {written} written, {failed} failed")]
    PartialBulkFailure {
        /// Items that were written
        written: u64,
        /// Items that were rejected
        failed: u64,
    },

    /// Operation is not supported by this backend
    #[error("operation not supported by this backend: {operation}")]
    Unsupported {
        /// Operation name
        operation: &'static str,
    },

    /// Invalid input (dates, patterns, retention days)
    #[error("validation error: {message}")]
    Validation {
        /// Validation error message
        message: String,
    },

    /// Backend rejected a request
    #[error("query error: {message}")]
    Query {
        /// Query error message
        message: String,
    },

    /// Response or document could not be (de)serialized
    #[error("serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// Simulated fault (for DST)
    #[error("simulated fault: {fault_type}")]
    SimulatedFault {
        /// Type of simulated fault
        fault_type: String,
    },
}

impl StorageError {
    /// Create a not-provisioned error.
    #[must_use]
    pub fn not_provisioned(target: impl Into<String>) -> Self {
        Self::NotProvisioned {
            target: target.into(),
        }
    }

    /// Create a provisioning failure for `step`.
    #[must_use]
    pub fn provisioning(step: &'static str, message: impl Into<String>) -> Self {
        Self::ProvisioningFailure {
            step,
            message: message.into(),
        }
    }

    /// Create a policy-not-found error.
    #[must_use]
    pub fn policy_not_found(policy: impl Into<String>) -> Self {
        Self::PolicyNotFound {
            policy: policy.into(),
        }
    }

    /// Create a backend-unreachable error.
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::BackendUnreachable {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a query error.
    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a simulated fault error.
    #[must_use]
    pub fn simulated_fault(fault_type: impl Into<String>) -> Self {
        Self::SimulatedFault {
            fault_type: fault_type.into(),
        }
    }

    /// Check if this is a transient error (can be retried).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::BackendUnreachable { .. } | Self::Timeout { .. } | Self::SimulatedFault { .. }
        )
    }

    /// Check if this is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
