//! Core data model
//!
//! - [`NodeIdentity`]: the single node this process manages
//! - [`CapabilitySnapshot`]: one discovery pass, immutable
//! - [`LabelSet`]: a node's full label mapping
//! - [`ReconcileRequest`]: "re-check convergence now"

use crate::error::IdentityError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Full label mapping on a node
///
/// Ordered so that diffs, logs and dry-run output are deterministic.
pub type LabelSet = BTreeMap<String, String>;

/// Name of the node this process is responsible for
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    /// Create identity from a node name
    ///
    /// Surrounding whitespace is trimmed.
    ///
    /// # Errors
    /// - `IdentityError::Empty` if nothing remains after trimming
    pub fn new(name: impl AsRef<str>) -> Result<Self, IdentityError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(Self(name.to_string()))
    }

    /// Node name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capabilities detected on the host at one instant
///
/// Maps capability key (e.g. `usb.082d.046d`) to presence. Never mutated
/// after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySnapshot(BTreeMap<String, bool>);

impl CapabilitySnapshot {
    /// Empty snapshot (no capabilities)
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Keys of capabilities flagged present
    pub fn present(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, present)| **present)
            .map(|(key, _)| key.as_str())
    }

    /// Number of capabilities flagged present
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.0.values().filter(|present| **present).count()
    }

    /// Presence flag for a key, if the key was reported at all
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<bool> {
        self.0.get(key).copied()
    }

    /// Number of reported keys, present or not
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if nothing was reported
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, bool)> for CapabilitySnapshot {
    fn from_iter<I: IntoIterator<Item = (K, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Opaque optimistic-concurrency token returned by the node store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    /// Wrap a store-provided version string
    #[inline]
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Raw version string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Request to re-check convergence of one node
///
/// Requests carry no payload beyond the identity, so duplicates and stale
/// requests are harmless.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    /// Node to reconcile
    pub identity: NodeIdentity,
}

impl ReconcileRequest {
    /// Create request for a node
    #[inline]
    #[must_use]
    pub fn new(identity: NodeIdentity) -> Self {
        Self { identity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_identity_trims() {
        let id = NodeIdentity::new("  worker-1\n").unwrap();
        assert_eq!(id.as_str(), "worker-1");
        assert_eq!(id.to_string(), "worker-1");
    }

    #[test]
    fn node_identity_rejects_blank() {
        assert!(matches!(NodeIdentity::new(" \n"), Err(IdentityError::Empty)));
    }

    #[test]
    fn snapshot_present_filters_absent() {
        let snapshot: CapabilitySnapshot =
            [("usb.a.b", true), ("usb.c.d", false), ("usb.e.f", true)]
                .into_iter()
                .collect();

        let present: Vec<_> = snapshot.present().collect();
        assert_eq!(present, vec!["usb.a.b", "usb.e.f"]);
        assert_eq!(snapshot.present_count(), 2);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get("usb.c.d"), Some(false));
        assert_eq!(snapshot.get("usb.x.y"), None);
    }
}
