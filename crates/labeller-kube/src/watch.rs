//! Node change notifications from a Kubernetes watch
//!
//! The raw watcher only says "this object now looks like X". Create vs.
//! update is recovered by remembering which nodes have been seen.

use futures::{future, Stream, StreamExt};
use k8s_openapi::api::core::v1::Node;
use kube::runtime::{watcher, WatchStreamExt};
use kube::api::WatchParams;
use kube::{Api, Client, ResourceExt};
use labeller_core::{ChangeKind, NodeIdentity, Notification};
use std::collections::HashSet;
use tracing::warn;

/// Watch one node and emit classified notifications
///
/// Watch errors are logged and the watch restarts with backoff; the
/// stream itself never ends on error.
pub fn node_notifications(
    client: Client,
    identity: &NodeIdentity,
) -> impl Stream<Item = Notification> + Send + 'static {
    let api: Api<Node> = Api::all(client);
    let config = watcher::Config::default().fields(&format!("metadata.name={identity}"));
    let mut classifier = ChangeClassifier::default();

    watcher(api, config)
        .default_backoff()
        .filter_map(move |event| {
            let notification = match event {
                Ok(event) => classifier.classify(event),
                Err(e) => {
                    warn!(error = %e, "node watch failed, retrying");
                    None
                }
            };
            future::ready(notification)
        })
}

/// Open and close one watch on the node
///
/// The stream from [`node_notifications`] retries forever, so a watch the
/// API server refuses (RBAC, bad selector) is only visible here.
///
/// # Errors
/// The API error that refused the watch request.
pub async fn verify_node_watch(client: Client, identity: &NodeIdentity) -> Result<(), kube::Error> {
    let api: Api<Node> = Api::all(client);
    let params = WatchParams::default()
        .fields(&format!("metadata.name={identity}"))
        .timeout(1);
    api.watch(&params, "0").await.map(drop)
}

/// Turns watcher events into create/update/delete notifications
#[derive(Debug, Default)]
pub struct ChangeClassifier {
    seen: HashSet<String>,
}

impl ChangeClassifier {
    /// Classify one watcher event
    ///
    /// Relist markers carry no object and produce nothing.
    pub fn classify(&mut self, event: watcher::Event<Node>) -> Option<Notification> {
        let (kind, node) = match event {
            watcher::Event::Apply(node) | watcher::Event::InitApply(node) => {
                let kind = if self.seen.insert(node.name_any()) {
                    ChangeKind::Create
                } else {
                    ChangeKind::Update
                };
                (kind, node)
            }
            watcher::Event::Delete(node) => {
                self.seen.remove(&node.name_any());
                (ChangeKind::Delete, node)
            }
            watcher::Event::Init | watcher::Event::InitDone => return None,
        };

        let subject = NodeIdentity::new(node.name_any()).ok()?;
        Some(Notification::new(kind, subject))
    }
}
