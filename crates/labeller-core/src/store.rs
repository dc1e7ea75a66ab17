//! Node store gateway
//!
//! The engine sees the cluster's node object as a versioned label map
//! with conditional writes.

use crate::error::StoreError;
use crate::types::{LabelSet, NodeIdentity, VersionToken};
use async_trait::async_trait;

/// Labels of a node together with the version they were read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Full label mapping
    pub labels: LabelSet,
    /// Version for the conditional write
    pub version: VersionToken,
}

/// Authoritative node storage
///
/// Timeouts, if any, belong to implementations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Fetch a node's labels
    ///
    /// # Errors
    /// - `StoreError::NotFound` if the node does not exist
    /// - `StoreError::Unavailable` on any other failure
    async fn get(&self, identity: &NodeIdentity) -> Result<NodeRecord, StoreError>;

    /// Replace a node's labels if it is still at `version`
    ///
    /// # Errors
    /// - `StoreError::Conflict` if the node changed since `version`
    /// - `StoreError::NotFound` if the node disappeared
    /// - `StoreError::Unavailable` on any other failure
    async fn update(
        &self,
        identity: &NodeIdentity,
        labels: &LabelSet,
        version: &VersionToken,
    ) -> Result<(), StoreError>;
}
