//! Reconciliation engine
//!
//! One cycle per request: `Fetching -> Diffing -> Applying`, ending in a
//! [`CycleOutcome`] or a [`ReconcileError`]. Each cycle re-reads the node
//! and recomputes the full desired label set, so nothing but the desired
//! snapshot survives between cycles.
//!
//! The engine tries each step once. Retrying is left to whoever delivers
//! the next request.

use crate::codec::LabelCodec;
use crate::config::{LabellerConfig, SnapshotPolicy};
use crate::converge::{converge, LabelDelta};
use crate::discovery::CapabilityProvider;
use crate::error::{DiscoveryError, ReconcileError, StoreError};
use crate::store::NodeStore;
use crate::types::{CapabilitySnapshot, NodeIdentity, ReconcileRequest};
use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Step of a reconciliation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Reading the node
    Fetching,
    /// Computing the label delta
    Diffing,
    /// Writing the node back
    Applying,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetching => "fetching",
            Self::Diffing => "diffing",
            Self::Applying => "applying",
        })
    }
}

/// Successful end of a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Labels were written
    Applied(LabelDelta),
    /// Labels already matched, nothing written
    Unchanged,
    /// Node not present (or not ours); nothing to do this cycle
    Skipped,
}

enum DesiredCapabilities {
    Fixed(CapabilitySnapshot),
    Rediscover(Arc<dyn CapabilityProvider>),
}

/// Converges one node's owned labels
pub struct Reconciler {
    identity: NodeIdentity,
    codec: LabelCodec,
    store: Arc<dyn NodeStore>,
    desired: DesiredCapabilities,
}

impl Reconciler {
    /// Create engine for the configured node
    ///
    /// With [`SnapshotPolicy::Startup`] discovery runs here, once.
    ///
    /// # Errors
    /// Returns error if startup discovery fails
    pub fn new(
        config: &LabellerConfig,
        store: Arc<dyn NodeStore>,
        provider: Arc<dyn CapabilityProvider>,
    ) -> Result<Self, DiscoveryError> {
        let desired = match config.snapshot_policy {
            SnapshotPolicy::Startup => {
                let snapshot = provider.discover()?;
                info!(capabilities = snapshot.present_count(), "captured startup snapshot");
                DesiredCapabilities::Fixed(snapshot)
            }
            SnapshotPolicy::PerCycle => DesiredCapabilities::Rediscover(provider),
        };

        Ok(Self {
            identity: config.identity.clone(),
            codec: LabelCodec::new(config.prefix.clone()),
            store,
            desired,
        })
    }

    /// Node this engine manages
    #[inline]
    #[must_use]
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Run one reconciliation cycle
    ///
    /// # Errors
    /// - `ReconcileError::Read` if the node cannot be fetched
    /// - `ReconcileError::Discovery` if per-cycle discovery fails
    /// - `ReconcileError::Conflict` if the node changed under us
    /// - `ReconcileError::Write` if the write fails otherwise
    #[instrument(name = "reconcile", skip_all, fields(node = %request.identity))]
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
    ) -> Result<CycleOutcome, ReconcileError> {
        if request.identity != self.identity {
            warn!("request for a node this engine does not manage");
            return Ok(CycleOutcome::Skipped);
        }

        debug!(phase = %Phase::Fetching, "entering phase");
        let record = match self.store.get(&self.identity).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                warn!("could not find node, skipping cycle");
                return Ok(CycleOutcome::Skipped);
            }
            Err(e) => {
                warn!(error = %e, "could not fetch node");
                return Err(ReconcileError::Read(e));
            }
        };

        debug!(phase = %Phase::Diffing, "entering phase");
        let desired = self.desired_snapshot().await?;
        let (labels, delta) = converge(&self.codec, &record.labels, &desired);
        if delta.is_empty() {
            debug!("labels already converged");
            return Ok(CycleOutcome::Unchanged);
        }

        debug!(phase = %Phase::Applying, "entering phase");
        match self
            .store
            .update(&self.identity, &labels, &record.version)
            .await
        {
            Ok(()) => {
                info!(
                    added = delta.upserts().len(),
                    removed = delta.removals().len(),
                    "updated node labels"
                );
                Ok(CycleOutcome::Applied(delta))
            }
            Err(StoreError::Conflict) => {
                warn!("node changed while writing, leaving it to the next trigger");
                Err(ReconcileError::Conflict)
            }
            Err(e) => {
                warn!(error = %e, "could not write node");
                Err(ReconcileError::Write(e))
            }
        }
    }

    async fn desired_snapshot(&self) -> Result<Cow<'_, CapabilitySnapshot>, ReconcileError> {
        match &self.desired {
            DesiredCapabilities::Fixed(snapshot) => Ok(Cow::Borrowed(snapshot)),
            DesiredCapabilities::Rediscover(provider) => {
                // Enumeration is synchronous filesystem work.
                let provider = Arc::clone(provider);
                let snapshot = tokio::task::spawn_blocking(move || provider.discover())
                    .await
                    .map_err(|e| DiscoveryError::Task(e.to_string()))??;
                debug!(capabilities = snapshot.present_count(), "rediscovered capabilities");
                Ok(Cow::Owned(snapshot))
            }
        }
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let policy = match self.desired {
            DesiredCapabilities::Fixed(_) => SnapshotPolicy::Startup,
            DesiredCapabilities::Rediscover(_) => SnapshotPolicy::PerCycle,
        };
        f.debug_struct("Reconciler")
            .field("identity", &self.identity)
            .field("prefix", self.codec.prefix())
            .field("snapshot_policy", &policy)
            .finish_non_exhaustive()
    }
}
