//! Cluster contract consumed by the watchdog

use super::engine::Engine;
use super::event::Event;
use crate::container::{Container, ContainerConfig};
use crate::error::Result;
use crate::network::Networks;
use async_trait::async_trait;
use std::sync::Arc;

/// Receives cluster lifecycle events.
///
/// Called on the cluster's dispatch path: implementations must hand off
/// any real work and return promptly.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event) -> Result<()>;
}

/// Result of placing a new container
#[derive(Clone)]
pub struct Placement {
    /// The created container
    pub container: Container,
    /// Engine the scheduler placed it on
    pub engine: Arc<dyn Engine>,
}

impl std::fmt::Debug for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Placement")
            .field("container", &self.container.id)
            .field("engine", &self.engine.id())
            .finish()
    }
}

/// The cluster-wide view and operations the watchdog relies on
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Subscribe to cluster events
    fn register_event_handler(&self, handler: Arc<dyn EventHandler>) -> Result<()>;

    /// All engines, healthy or not
    fn engines(&self) -> Vec<Arc<dyn Engine>>;

    /// All containers across all engines
    fn containers(&self) -> Vec<Container>;

    /// All networks as reported by the engines (may contain duplicates)
    fn networks(&self) -> Networks;

    /// Schedule and create a container
    async fn create_container(&self, config: ContainerConfig, name: &str) -> Result<Placement>;

    /// Start a created container
    async fn start_container(&self, container: &Container) -> Result<()>;

    /// Any healthy engine, used as a worker for network cleanup
    fn pick_healthy_engine(&self) -> Result<Arc<dyn Engine>>;
}
