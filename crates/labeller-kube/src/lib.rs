//! Labeller Kube - Kubernetes collaborators for the labeller engine
//!
//! - [`KubeNodeStore`]: `Node` reads and conditional replaces
//! - [`node_notifications`]: node watch as a notification stream
//! - [`verify_node_watch`]: startup check that the watch is allowed

#![allow(missing_docs)]

pub mod store;
pub mod watch;

pub use store::KubeNodeStore;
pub use watch::{node_notifications, verify_node_watch, ChangeClassifier};
