//! Convergence step
//!
//! Computes the minimal change that makes a node's owned labels match a
//! capability snapshot, and applies it to an in-memory label set.
//!
//! # Invariants
//! - Only keys under the reserved prefix are ever inserted or removed
//! - `converge(converge(L, D), D) == converge(L, D)`
//! - After `converge(L, D)` the owned keys are exactly `encode(D)` keys

use crate::codec::{LabelCodec, OwnedLabelKey};
use crate::types::{CapabilitySnapshot, LabelSet};
use std::collections::{BTreeMap, BTreeSet};

/// Minimal change to a node's owned labels
///
/// Upserts and removals target disjoint keys, so application order does
/// not matter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelDelta {
    upserts: BTreeMap<OwnedLabelKey, String>,
    removals: BTreeSet<OwnedLabelKey>,
}

impl LabelDelta {
    /// Labels to insert or overwrite
    #[inline]
    #[must_use]
    pub fn upserts(&self) -> &BTreeMap<OwnedLabelKey, String> {
        &self.upserts
    }

    /// Labels to remove
    #[inline]
    #[must_use]
    pub fn removals(&self) -> &BTreeSet<OwnedLabelKey> {
        &self.removals
    }

    /// Check if applying this delta changes nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    /// Apply to a label set in place
    pub fn apply(&self, labels: &mut LabelSet) {
        for key in &self.removals {
            labels.remove(key.as_str());
        }
        for (key, value) in &self.upserts {
            labels.insert(key.as_str().to_string(), value.clone());
        }
    }
}

/// Compute the minimal delta from `current` to the labels `desired` implies
#[must_use]
pub fn plan(codec: &LabelCodec, current: &LabelSet, desired: &CapabilitySnapshot) -> LabelDelta {
    let wanted = codec.encode(desired);

    let removals = codec
        .owned_keys(current)
        .into_iter()
        .filter(|key| !wanted.contains_key(key))
        .collect();

    let upserts = wanted
        .into_iter()
        .filter(|(key, value)| current.get(key.as_str()) != Some(value))
        .collect();

    LabelDelta { upserts, removals }
}

/// Produce the converged label set and the delta that got there
#[must_use]
pub fn converge(
    codec: &LabelCodec,
    current: &LabelSet,
    desired: &CapabilitySnapshot,
) -> (LabelSet, LabelDelta) {
    let delta = plan(codec, current, desired);
    let mut next = current.clone();
    delta.apply(&mut next);
    (next, delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PRESENT_VALUE;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn snapshot(keys: &[&str]) -> CapabilitySnapshot {
        keys.iter().map(|k| (*k, true)).collect()
    }

    #[test]
    fn converge_adds_prefixed_label_to_empty_node() {
        let codec = LabelCodec::default();
        let (next, delta) = converge(&codec, &LabelSet::new(), &snapshot(&["vendorA.productX"]));

        assert_eq!(next, labels(&[("g4v.dev/vendorA.productX", PRESENT_VALUE)]));
        assert_eq!(delta.upserts().len(), 1);
        assert!(delta.removals().is_empty());
    }

    #[test]
    fn converge_prunes_stale_and_keeps_foreign() {
        let codec = LabelCodec::default();
        let current = labels(&[("g4v.dev/oldDevice", "true"), ("team", "infra")]);

        let (next, delta) = converge(&codec, &current, &CapabilitySnapshot::empty());

        assert_eq!(next, labels(&[("team", "infra")]));
        assert_eq!(delta.removals().len(), 1);
        assert!(codec.owned_keys(&next).is_empty());
    }

    #[test]
    fn converge_overwrites_wrong_value() {
        let codec = LabelCodec::default();
        let current = labels(&[("g4v.dev/usb.1.2", "false")]);

        let (next, delta) = converge(&codec, &current, &snapshot(&["usb.1.2"]));

        assert_eq!(next, labels(&[("g4v.dev/usb.1.2", PRESENT_VALUE)]));
        assert_eq!(delta.upserts().len(), 1);
    }

    #[test]
    fn plan_is_empty_when_converged() {
        let codec = LabelCodec::default();
        let current = labels(&[("g4v.dev/usb.1.2", "true"), ("zone", "a")]);

        assert!(plan(&codec, &current, &snapshot(&["usb.1.2"])).is_empty());
    }

    fn arb_labels() -> impl Strategy<Value = LabelSet> {
        let key = prop_oneof![
            "[a-z]{1,8}",
            "[a-z]{1,8}".prop_map(|s| format!("g4v.dev/{s}")),
            "[a-z]{1,8}".prop_map(|s| format!("g4v.devices/{s}")),
        ];
        prop::collection::btree_map(key, "[a-z]{0,5}", 0..12)
    }

    fn arb_snapshot() -> impl Strategy<Value = CapabilitySnapshot> {
        prop::collection::btree_map("[a-z]{1,8}", any::<bool>(), 0..12)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn converge_is_idempotent(current in arb_labels(), desired in arb_snapshot()) {
            let codec = LabelCodec::default();
            let (once, _) = converge(&codec, &current, &desired);
            let (twice, delta) = converge(&codec, &once, &desired);
            prop_assert_eq!(&once, &twice);
            prop_assert!(delta.is_empty());
        }

        #[test]
        fn converge_touches_only_owned_keys(current in arb_labels(), desired in arb_snapshot()) {
            let codec = LabelCodec::default();
            let (next, _) = converge(&codec, &current, &desired);

            for (key, value) in &current {
                if codec.prefix().claim(key).is_none() {
                    prop_assert_eq!(next.get(key), Some(value));
                }
            }
            for key in next.keys() {
                if !current.contains_key(key) {
                    prop_assert!(codec.prefix().claim(key).is_some());
                }
            }
        }

        #[test]
        fn converge_owned_keys_match_encoding(current in arb_labels(), desired in arb_snapshot()) {
            let codec = LabelCodec::default();
            let (next, _) = converge(&codec, &current, &desired);

            let expected: BTreeSet<_> = codec.encode(&desired).into_keys().collect();
            prop_assert_eq!(codec.owned_keys(&next), expected);
        }
    }
}
