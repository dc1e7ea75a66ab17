//! Label codec
//!
//! Converts capability snapshots into labels under a reserved prefix and
//! recognises which of a node's existing labels belong to that prefix.
//!
//! Ownership is carried in the type: an [`OwnedLabelKey`] can only be built
//! through a [`LabelPrefix`], so a key outside the namespace cannot be
//! handed to the convergence step by accident.

use crate::error::ConfigError;
use crate::types::{CapabilitySnapshot, LabelSet};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Value written for every present capability
pub const PRESENT_VALUE: &str = "true";

/// Prefix used when none is configured
pub const DEFAULT_PREFIX: &str = "g4v.dev/";

const MAX_PREFIX_LEN: usize = 253;

/// Owned labels keyed by their typed key
pub type OwnedLabels = BTreeMap<OwnedLabelKey, String>;

/// Reserved label-key namespace, e.g. `g4v.dev/`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelPrefix(String);

impl LabelPrefix {
    /// Parse and validate a prefix
    ///
    /// The prefix must be a DNS subdomain followed by `/`, which is the
    /// shape Kubernetes accepts for a label-key prefix.
    ///
    /// # Errors
    /// - `ConfigError::InvalidPrefix` describing the first violation found
    pub fn parse(prefix: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidPrefix {
            prefix: prefix.to_string(),
            reason,
        };

        let domain = prefix
            .strip_suffix('/')
            .ok_or_else(|| invalid("must end with '/'"))?;

        if domain.is_empty() {
            return Err(invalid("domain part is empty"));
        }
        if domain.len() > MAX_PREFIX_LEN {
            return Err(invalid("domain part exceeds 253 characters"));
        }
        if !domain
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
        {
            return Err(invalid("only lowercase alphanumerics, '-' and '.' are allowed"));
        }
        let edge_ok = |b: Option<u8>| b.is_some_and(|b| b.is_ascii_alphanumeric());
        if !edge_ok(domain.bytes().next()) || !edge_ok(domain.bytes().last()) {
            return Err(invalid("must start and end with an alphanumeric character"));
        }

        Ok(Self(prefix.to_string()))
    }

    /// Prefix string including the trailing `/`
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Claim an existing label key if it lies in this namespace
    #[must_use]
    pub fn claim(&self, key: &str) -> Option<OwnedLabelKey> {
        key.starts_with(&self.0)
            .then(|| OwnedLabelKey(key.to_string()))
    }

    /// Label key representing a capability
    #[must_use]
    pub fn label_for(&self, capability: &str) -> OwnedLabelKey {
        OwnedLabelKey(format!("{}{}", self.0, capability))
    }
}

impl Default for LabelPrefix {
    fn default() -> Self {
        Self(DEFAULT_PREFIX.to_string())
    }
}

impl FromStr for LabelPrefix {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for LabelPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Label key known to lie under the reserved prefix
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnedLabelKey(String);

impl OwnedLabelKey {
    /// Full label key
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnedLabelKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<OwnedLabelKey> for String {
    fn from(key: OwnedLabelKey) -> Self {
        key.0
    }
}

/// Pure conversions between snapshots and owned labels
#[derive(Debug, Clone, Default)]
pub struct LabelCodec {
    prefix: LabelPrefix,
}

impl LabelCodec {
    /// Create codec for a prefix
    #[inline]
    #[must_use]
    pub fn new(prefix: LabelPrefix) -> Self {
        Self { prefix }
    }

    /// Reserved prefix
    #[inline]
    #[must_use]
    pub fn prefix(&self) -> &LabelPrefix {
        &self.prefix
    }

    /// Encode present capabilities as owned labels
    ///
    /// Absent capabilities produce no entry; absence is expressed by the
    /// label not existing.
    #[must_use]
    pub fn encode(&self, snapshot: &CapabilitySnapshot) -> OwnedLabels {
        snapshot
            .present()
            .map(|capability| (self.prefix.label_for(capability), PRESENT_VALUE.to_string()))
            .collect()
    }

    /// Keys of `labels` that lie under the reserved prefix
    #[must_use]
    pub fn owned_keys(&self, labels: &LabelSet) -> BTreeSet<OwnedLabelKey> {
        labels
            .keys()
            .filter_map(|key| self.prefix.claim(key))
            .collect()
    }

    /// Encode straight to a plain label mapping (dry-run output)
    #[must_use]
    pub fn encode_labels(&self, snapshot: &CapabilitySnapshot) -> LabelSet {
        self.encode(snapshot)
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect()
    }
}
