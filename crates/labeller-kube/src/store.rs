//! Node store backed by the Kubernetes API

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, PostParams};
use kube::Client;
use labeller_core::{LabelSet, NodeIdentity, NodeRecord, NodeStore, StoreError, VersionToken};
use tracing::debug;

/// Reads and conditionally replaces `Node` objects
///
/// The version token is the node's `metadata.resourceVersion`; the API
/// server rejects a replace carrying a stale one with 409.
#[derive(Clone)]
pub struct KubeNodeStore {
    api: Api<Node>,
}

impl KubeNodeStore {
    /// Create store on a client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }

    async fn fetch(&self, identity: &NodeIdentity) -> Result<Node, StoreError> {
        self.api
            .get_opt(identity.as_str())
            .await
            .map_err(classify)?
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl NodeStore for KubeNodeStore {
    async fn get(&self, identity: &NodeIdentity) -> Result<NodeRecord, StoreError> {
        let node = self.fetch(identity).await?;
        let version = node
            .metadata
            .resource_version
            .ok_or_else(|| StoreError::Unavailable("node has no resourceVersion".to_string()))?;

        Ok(NodeRecord {
            labels: node.metadata.labels.unwrap_or_default(),
            version: VersionToken::new(version),
        })
    }

    async fn update(
        &self,
        identity: &NodeIdentity,
        labels: &LabelSet,
        version: &VersionToken,
    ) -> Result<(), StoreError> {
        let node = relabel(self.fetch(identity).await?, labels, version)?;
        let replaced = self
            .api
            .replace(identity.as_str(), &PostParams::default(), &node)
            .await
            .map_err(classify)?;

        debug!(
            node = %identity,
            resource_version = replaced.metadata.resource_version.as_deref().unwrap_or_default(),
            "replaced node"
        );
        Ok(())
    }
}

/// Swap in `labels` if `node` is still at `version`
fn relabel(mut node: Node, labels: &LabelSet, version: &VersionToken) -> Result<Node, StoreError> {
    if node.metadata.resource_version.as_deref() != Some(version.as_str()) {
        return Err(StoreError::Conflict);
    }
    node.metadata.labels = Some(labels.clone());
    Ok(node)
}

fn classify(err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict,
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound,
        other => StoreError::Unavailable(other.to_string()),
    }
}
