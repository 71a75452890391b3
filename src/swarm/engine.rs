//! Engine contract: one node of the cluster as the watchdog sees it

use crate::container::Container;
use crate::error::Result;
use crate::network::NetworkClient;
use async_trait::async_trait;
use std::sync::Arc;

/// A cluster node and the manager-side bookkeeping of its containers.
///
/// `add_container`/`forget_container` only touch the bookkeeping; the node
/// itself is changed through `remove_container` and the network client.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Engine ID
    fn id(&self) -> &str;

    /// Engine name (usually the node hostname)
    fn name(&self) -> &str;

    /// Whether the node currently answers health checks
    fn is_healthy(&self) -> bool;

    /// Containers believed to run on this node
    fn containers(&self) -> Vec<Container>;

    /// Track a container on this node
    fn add_container(&self, container: Container);

    /// Stop tracking a container on this node
    fn forget_container(&self, container: &Container);

    /// Replace the bookkeeping with the node's actual container list
    async fn refresh_containers(&self, full: bool) -> Result<()>;

    /// Delete a container on the node (kill first if `force`)
    async fn remove_container(&self, container: &Container, force: bool, volumes: bool)
        -> Result<()>;

    /// Network client talking to this node
    fn network_client(&self) -> Arc<dyn NetworkClient>;
}
