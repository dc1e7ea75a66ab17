//! Error types for the labeller core
//!
//! One enum per concern:
//! - Configuration validation
//! - Node identity resolution
//! - Capability discovery
//! - Node store access
//! - Reconciliation cycles

use crate::engine::Phase;

/// Configuration validation errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Label prefix is malformed
    #[error("invalid label prefix {prefix:?}: {reason}")]
    InvalidPrefix {
        /// Offending prefix
        prefix: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Poll interval of zero would spin the timer
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    /// Retry backoff bounds are inconsistent
    #[error("retry base delay {base_ms}ms exceeds cap {cap_ms}ms")]
    InvalidRetry {
        /// Base delay in milliseconds
        base_ms: u128,
        /// Cap in milliseconds
        cap_ms: u128,
    },

    /// Unknown value for an enumerated option
    #[error("unknown {option} value: {value:?}")]
    UnknownOption {
        /// Option name
        option: &'static str,
        /// Rejected value
        value: String,
    },
}

/// Node identity resolution errors
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Identity resolved to an empty string
    #[error("node identity is empty")]
    Empty,

    /// Hostname file could not be read
    #[error("cannot read hostname file {path}: {source}")]
    HostnameFile {
        /// Path that was read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Capability discovery errors
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Device enumeration root could not be listed
    #[error("cannot enumerate devices under {path}: {source}")]
    Enumerate {
        /// Directory that was listed
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A device id file held something other than a hex id
    #[error("malformed device id {value:?} in {path}")]
    MalformedId {
        /// File that was read
        path: String,
        /// Raw content
        value: String,
    },

    /// The blocking enumeration task panicked or was cancelled
    #[error("device enumeration task failed: {0}")]
    Task(String),
}

/// Node store gateway errors
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// Node does not exist
    #[error("node not found")]
    NotFound,

    /// Stored version changed since it was read
    #[error("node was modified concurrently")]
    Conflict,

    /// Any other transport or API failure
    #[error("node store unavailable: {0}")]
    Unavailable(String),
}

/// Reconciliation cycle failures
///
/// `NotFound` never appears here: a missing node ends the cycle as
/// [`CycleOutcome::Skipped`](crate::engine::CycleOutcome::Skipped).
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Reading the node failed
    #[error("could not fetch node: {0}")]
    Read(#[source] StoreError),

    /// Conditional write lost against a concurrent writer
    #[error("node write conflicted with a concurrent update")]
    Conflict,

    /// Writing the node failed for another reason
    #[error("could not write node: {0}")]
    Write(#[source] StoreError),

    /// Per-cycle rediscovery failed
    #[error("capability discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

impl ReconcileError {
    /// Phase the cycle was in when it failed
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::Read(_) => Phase::Fetching,
            Self::Discovery(_) => Phase::Diffing,
            Self::Conflict | Self::Write(_) => Phase::Applying,
        }
    }

    /// Check if a later trigger can be expected to succeed
    ///
    /// Every cycle recomputes from scratch, so all failures are retryable
    /// except a malformed device id, which will not fix itself.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Discovery(DiscoveryError::MalformedId { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_error_phase() {
        assert_eq!(
            ReconcileError::Read(StoreError::Unavailable("x".into())).phase(),
            Phase::Fetching
        );
        assert_eq!(ReconcileError::Conflict.phase(), Phase::Applying);
        assert_eq!(
            ReconcileError::Write(StoreError::Unavailable("x".into())).phase(),
            Phase::Applying
        );
    }

    #[test]
    fn reconcile_error_is_retryable() {
        assert!(ReconcileError::Conflict.is_retryable());
        assert!(ReconcileError::Read(StoreError::Unavailable("down".into())).is_retryable());

        let malformed = ReconcileError::Discovery(DiscoveryError::MalformedId {
            path: "/sys/bus/usb/devices/1-1/idVendor".into(),
            value: "zz".into(),
        });
        assert!(!malformed.is_retryable());
    }

    #[test]
    fn store_error_display() {
        assert!(StoreError::Conflict.to_string().contains("concurrently"));
        assert!(StoreError::Unavailable("timeout".into())
            .to_string()
            .contains("timeout"));
    }
}
