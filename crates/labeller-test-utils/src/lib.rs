//! Testing utilities for the labeller workspace
//!
//! Shared fakes and fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use labeller_core::{
    CapabilityProvider, CapabilitySnapshot, DiscoveryError, LabelSet, LabellerConfig, NodeIdentity,
    NodeRecord, NodeStore, StoreError, VersionToken,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const TEST_NODE: &str = "node-1";

pub fn test_identity() -> NodeIdentity {
    NodeIdentity::new(TEST_NODE).unwrap()
}

pub fn test_config() -> LabellerConfig {
    LabellerConfig::new(test_identity())
}

pub fn labels(pairs: &[(&str, &str)]) -> LabelSet {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub fn snapshot(present: &[&str]) -> CapabilitySnapshot {
    present.iter().map(|k| (*k, true)).collect()
}

/// Provider returning the same snapshot on every call
#[derive(Debug, Clone, Default)]
pub struct StaticProvider(pub CapabilitySnapshot);

impl StaticProvider {
    pub fn present(keys: &[&str]) -> Self {
        Self(snapshot(keys))
    }
}

impl CapabilityProvider for StaticProvider {
    fn discover(&self) -> Result<CapabilitySnapshot, DiscoveryError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
struct StoredNode {
    labels: LabelSet,
    version: u64,
}

/// Versioned in-memory node store
///
/// Tracks how many calls overlap so tests can assert serialisation.
#[derive(Debug, Default)]
pub struct InMemoryNodeStore {
    nodes: Mutex<HashMap<NodeIdentity, StoredNode>>,
    get_errors: Mutex<VecDeque<StoreError>>,
    update_errors: Mutex<VecDeque<StoreError>>,
    latency: Mutex<Duration>,
    gets: AtomicUsize,
    updates: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, identity: &NodeIdentity, labels: LabelSet) -> Self {
        self.put(identity, labels);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    /// Insert or overwrite a node as an external writer would
    pub fn put(&self, identity: &NodeIdentity, labels: LabelSet) {
        let mut nodes = self.nodes.lock();
        let version = nodes.get(identity).map_or(1, |n| n.version + 1);
        nodes.insert(identity.clone(), StoredNode { labels, version });
    }

    pub fn labels(&self, identity: &NodeIdentity) -> Option<LabelSet> {
        self.nodes.lock().get(identity).map(|n| n.labels.clone())
    }

    pub fn fail_next_get(&self, error: StoreError) {
        self.get_errors.lock().push_back(error);
    }

    pub fn fail_next_update(&self, error: StoreError) {
        self.update_errors.lock().push_back(error);
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        InFlight(&self.in_flight)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn get(&self, identity: &NodeIdentity) -> Result<NodeRecord, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;

        if let Some(error) = self.get_errors.lock().pop_front() {
            return Err(error);
        }
        self.nodes
            .lock()
            .get(identity)
            .map(|n| NodeRecord {
                labels: n.labels.clone(),
                version: VersionToken::new(n.version.to_string()),
            })
            .ok_or(StoreError::NotFound)
    }

    async fn update(
        &self,
        identity: &NodeIdentity,
        labels: &LabelSet,
        version: &VersionToken,
    ) -> Result<(), StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;

        if let Some(error) = self.update_errors.lock().pop_front() {
            return Err(error);
        }
        let mut nodes = self.nodes.lock();
        let node = nodes.get_mut(identity).ok_or(StoreError::NotFound)?;
        if node.version.to_string() != version.as_str() {
            return Err(StoreError::Conflict);
        }
        node.labels = labels.clone();
        node.version += 1;
        Ok(())
    }
}
