//! Labeller Core - node label reconciliation
//!
//! Keeps the labels under a reserved prefix on one cluster node equal to
//! the set of capabilities its host exposes:
//! - [`codec`]: capability snapshot <-> owned labels
//! - [`converge`]: minimal, idempotent label delta
//! - [`engine`]: fetch -> diff -> apply, once per request
//! - [`trigger`]: event and timer triggers feeding one serial queue
//!
//! # Example
//!
//! ```rust,ignore
//! use labeller_core::prelude::*;
//!
//! let config = LabellerConfig::new(NodeIdentity::new("worker-1")?);
//! let engine = Arc::new(Reconciler::new(&config, store, provider)?);
//! let scheduler = TriggerScheduler::new(&config, engine);
//!
//! let stats = scheduler.run(notifications, shutdown_rx).await;
//! ```

#![allow(missing_docs)]

pub mod codec;
pub mod config;
pub mod converge;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod identity;
pub mod store;
pub mod trigger;
pub mod types;

pub use codec::{LabelCodec, LabelPrefix, OwnedLabelKey, OwnedLabels, PRESENT_VALUE};
pub use config::{LabellerConfig, RetryPolicy, SnapshotPolicy, TickMode};
pub use converge::{converge, plan, LabelDelta};
pub use discovery::{CapabilityProvider, SysfsUsbProvider};
pub use engine::{CycleOutcome, Phase, Reconciler};
pub use error::{ConfigError, DiscoveryError, IdentityError, ReconcileError, StoreError};
pub use identity::resolve_identity;
pub use store::{NodeRecord, NodeStore};
pub use trigger::{
    AdmissionFilter, AdmittedKinds, ChangeKind, Notification, SchedulerStats, TriggerScheduler,
    TriggerSource,
};
pub use types::{CapabilitySnapshot, LabelSet, NodeIdentity, ReconcileRequest, VersionToken};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring the labeller
    pub use crate::{
        CapabilityProvider, CapabilitySnapshot, ChangeKind, CycleOutcome, LabelCodec,
        LabellerConfig, NodeIdentity, NodeStore, Notification, Reconciler, TriggerScheduler,
    };
    pub use std::sync::Arc;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
