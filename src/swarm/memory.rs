//! In-memory cluster
//!
//! Implements the cluster, engine and network client contracts entirely in
//! memory, with knobs to make individual operations fail. Each engine keeps
//! two views: the manager-side bookkeeping (what the watchdog sees through
//! [`Engine::containers`]) and the containers actually present on the node,
//! which only converge on [`Engine::refresh_containers`].

use super::cluster::{Cluster, EventHandler, Placement};
use super::engine::Engine;
use super::event::{Event, EventStatus};
use crate::container::{Container, ContainerConfig, ContainerInfo, EngineRef, NetworkSettings};
use crate::error::{Result, WatchdogError};
use crate::network::config::{EndpointSettings, NetworkDescriptor, Networks};
use crate::network::NetworkClient;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// A network call recorded by [`MemoryNetworkClient`]
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkCall {
    Disconnect {
        network: String,
        container: String,
        force: bool,
    },
    Connect {
        network: String,
        container: String,
        endpoint: EndpointSettings,
    },
}

/// Network client that records calls and fails or hangs on demand
#[derive(Default)]
pub struct MemoryNetworkClient {
    calls: Mutex<Vec<NetworkCall>>,
    failing: RwLock<Vec<String>>,
    hanging: RwLock<Vec<String>>,
}

impl MemoryNetworkClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call on `network` fail
    pub fn fail_network(&self, network: &str) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(network.to_string());
    }

    /// Make every call on `network` block until it is timed out
    pub fn hang_network(&self, network: &str) {
        self.hanging
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(network.to_string());
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<NetworkCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Connect calls as `(network, endpoint)` pairs
    pub fn connects(&self) -> Vec<(String, EndpointSettings)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NetworkCall::Connect {
                    network, endpoint, ..
                } => Some((network, endpoint)),
                NetworkCall::Disconnect { .. } => None,
            })
            .collect()
    }

    /// Networks passed to disconnect calls
    pub fn disconnects(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NetworkCall::Disconnect { network, .. } => Some(network),
                NetworkCall::Connect { .. } => None,
            })
            .collect()
    }

    async fn outcome(&self, network: &str, call: NetworkCall) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| WatchdogError::Lock("Failed to acquire call log lock".to_string()))?
            .push(call);

        let hangs = self
            .hanging
            .read()
            .map_err(|_| WatchdogError::Lock("Failed to acquire read lock".to_string()))?
            .iter()
            .any(|n| n == network);
        if hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let fails = self
            .failing
            .read()
            .map_err(|_| WatchdogError::Lock("Failed to acquire read lock".to_string()))?
            .iter()
            .any(|n| n == network);
        if fails {
            return Err(WatchdogError::Network(format!(
                "network {} rejected the request",
                network
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl NetworkClient for MemoryNetworkClient {
    async fn disconnect(&self, network: &str, container: &str, force: bool) -> Result<()> {
        let call = NetworkCall::Disconnect {
            network: network.to_string(),
            container: container.to_string(),
            force,
        };
        self.outcome(network, call).await
    }

    async fn connect(
        &self,
        network: &str,
        container: &str,
        endpoint: &EndpointSettings,
    ) -> Result<()> {
        let call = NetworkCall::Connect {
            network: network.to_string(),
            container: container.to_string(),
            endpoint: endpoint.clone(),
        };
        self.outcome(network, call).await
    }
}

/// In-memory engine
pub struct MemoryEngine {
    id: String,
    name: String,
    healthy: AtomicBool,
    /// Manager-side bookkeeping
    containers: RwLock<HashMap<String, Container>>,
    /// Containers present on the node
    live: RwLock<HashMap<String, Container>>,
    removed: Mutex<Vec<String>>,
    network: Arc<MemoryNetworkClient>,
    failing_removals: RwLock<Vec<String>>,
    fail_refresh: AtomicBool,
}

impl MemoryEngine {
    /// Create a healthy engine with no containers
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            healthy: AtomicBool::new(true),
            containers: RwLock::new(HashMap::new()),
            live: RwLock::new(HashMap::new()),
            removed: Mutex::new(Vec::new()),
            network: Arc::new(MemoryNetworkClient::new()),
            failing_removals: RwLock::new(Vec::new()),
            fail_refresh: AtomicBool::new(false),
        }
    }

    pub fn engine_ref(&self) -> EngineRef {
        EngineRef::new(&self.id, &self.name)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Place a container on the node and track it
    pub fn run(&self, mut container: Container) -> Container {
        container.engine = self.engine_ref();
        self.live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(container.id.clone(), container.clone());
        self.add_container(container.clone());
        container
    }

    /// Place a container on the node without tracking it, as if it was
    /// started while the manager could not see the node
    pub fn run_untracked(&self, mut container: Container) -> Container {
        container.engine = self.engine_ref();
        self.live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(container.id.clone(), container.clone());
        container
    }

    /// IDs of containers deleted from the node
    pub fn removed(&self) -> Vec<String> {
        self.removed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Containers present on the node
    pub fn live_containers(&self) -> Vec<Container> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn network(&self) -> Arc<MemoryNetworkClient> {
        self.network.clone()
    }

    /// Make every removal of `container_id` fail
    pub fn fail_removal_of(&self, container_id: &str) {
        self.failing_removals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(container_id.to_string());
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    fn mark_running(&self, container_id: &str) -> Result<()> {
        let mut live = self
            .live
            .write()
            .map_err(|_| WatchdogError::Lock("Failed to acquire write lock".to_string()))?;
        let container = live
            .get_mut(container_id)
            .ok_or_else(|| WatchdogError::ContainerNotFound(container_id.to_string()))?;
        container.info.state.running = true;

        if let Some(tracked) = self
            .containers
            .write()
            .map_err(|_| WatchdogError::Lock("Failed to acquire write lock".to_string()))?
            .get_mut(container_id)
        {
            tracked.info.state.running = true;
        }
        Ok(())
    }

    fn tracked_count(&self) -> usize {
        self.containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn containers(&self) -> Vec<Container> {
        let mut containers: Vec<Container> = self
            .containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        containers.sort_by(|a, b| a.id.cmp(&b.id));
        containers
    }

    fn add_container(&self, container: Container) {
        self.containers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(container.id.clone(), container);
    }

    fn forget_container(&self, container: &Container) {
        self.containers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&container.id);
    }

    async fn refresh_containers(&self, _full: bool) -> Result<()> {
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(WatchdogError::Engine(format!(
                "engine {} did not answer the container list request",
                self.name
            )));
        }

        let live = self
            .live
            .read()
            .map_err(|_| WatchdogError::Lock("Failed to acquire read lock".to_string()))?
            .clone();
        *self
            .containers
            .write()
            .map_err(|_| WatchdogError::Lock("Failed to acquire write lock".to_string()))? = live;
        Ok(())
    }

    async fn remove_container(
        &self,
        container: &Container,
        force: bool,
        _volumes: bool,
    ) -> Result<()> {
        let refused = self
            .failing_removals
            .read()
            .map_err(|_| WatchdogError::Lock("Failed to acquire read lock".to_string()))?
            .contains(&container.id);
        if refused {
            return Err(WatchdogError::Engine(format!(
                "engine {} refused to remove {}",
                self.name, container.id
            )));
        }

        let mut live = self
            .live
            .write()
            .map_err(|_| WatchdogError::Lock("Failed to acquire write lock".to_string()))?;
        let existing = live
            .get(&container.id)
            .ok_or_else(|| WatchdogError::ContainerNotFound(container.id.clone()))?;
        if existing.info.state.running && !force {
            return Err(WatchdogError::Container(format!(
                "container {} is running, stop it first or force removal",
                container.id
            )));
        }
        live.remove(&container.id);
        drop(live);

        self.forget_container(container);
        self.removed
            .lock()
            .map_err(|_| WatchdogError::Lock("Failed to acquire removal log lock".to_string()))?
            .push(container.id.clone());
        Ok(())
    }

    fn network_client(&self) -> Arc<dyn NetworkClient> {
        self.network.clone()
    }
}

/// A container creation request recorded by [`MemoryCluster`]
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub name: String,
    pub config: ContainerConfig,
}

/// In-memory cluster
#[derive(Default)]
pub struct MemoryCluster {
    engines: RwLock<Vec<Arc<MemoryEngine>>>,
    networks: RwLock<Vec<NetworkDescriptor>>,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    create_failures: AtomicUsize,
    start_failures: AtomicUsize,
    start_attempts: AtomicUsize,
    created: Mutex<Vec<CreateRequest>>,
    started: Mutex<Vec<String>>,
}

/// Fail every future start
pub const ALWAYS: usize = usize::MAX;

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cluster from a snapshot
    pub fn from_snapshot(snapshot: ClusterSnapshot) -> Self {
        let cluster = Self::new();
        for engine_snapshot in snapshot.engines {
            let engine = Arc::new(MemoryEngine::new(&engine_snapshot.id, &engine_snapshot.name));
            engine.set_healthy(engine_snapshot.healthy);
            for container in engine_snapshot.containers {
                engine.run(container);
            }
            cluster.add_engine(engine);
        }
        for network in snapshot.networks {
            cluster.add_network(network);
        }
        cluster
    }

    /// Capture engines, tracked containers and networks
    pub fn snapshot(&self) -> ClusterSnapshot {
        let engines = self
            .memory_engines()
            .iter()
            .map(|engine| EngineSnapshot {
                id: engine.id().to_string(),
                name: engine.name().to_string(),
                healthy: engine.is_healthy(),
                containers: engine.containers(),
            })
            .collect();

        ClusterSnapshot {
            engines,
            networks: self
                .networks
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    pub fn add_engine(&self, engine: Arc<MemoryEngine>) {
        self.engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(engine);
    }

    pub fn add_network(&self, network: NetworkDescriptor) {
        self.networks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(network);
    }

    /// Look up an engine by ID
    pub fn engine(&self, id: &str) -> Option<Arc<MemoryEngine>> {
        self.memory_engines().into_iter().find(|e| e.id() == id)
    }

    /// Make the next `count` creations fail
    pub fn fail_next_creates(&self, count: usize) {
        self.create_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` starts fail ([`ALWAYS`] for all of them)
    pub fn fail_next_starts(&self, count: usize) {
        self.start_failures.store(count, Ordering::SeqCst);
    }

    /// Creation requests that succeeded, in order
    pub fn created(&self) -> Vec<CreateRequest> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// IDs of containers started successfully
    pub fn started(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of start calls, successful or not
    pub fn start_attempts(&self) -> usize {
        self.start_attempts.load(Ordering::SeqCst)
    }

    /// Deliver an event to every registered handler
    pub fn emit(&self, event: Event) -> Result<()> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| WatchdogError::Lock("Failed to acquire read lock".to_string()))?
            .clone();
        for handler in handlers {
            handler.handle(&event)?;
        }
        Ok(())
    }

    /// Mark an engine unhealthy and announce the disconnect
    pub fn disconnect_engine(&self, id: &str) -> Result<()> {
        let engine = self
            .engine(id)
            .ok_or_else(|| WatchdogError::EngineNotFound(id.to_string()))?;
        engine.set_healthy(false);
        self.emit(Event::new(EventStatus::EngineDisconnect, engine))
    }

    /// Mark an engine healthy and announce the reconnect
    pub fn reconnect_engine(&self, id: &str) -> Result<()> {
        let engine = self
            .engine(id)
            .ok_or_else(|| WatchdogError::EngineNotFound(id.to_string()))?;
        engine.set_healthy(true);
        self.emit(Event::new(EventStatus::EngineReconnect, engine))
    }

    fn memory_engines(&self) -> Vec<Arc<MemoryEngine>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Decrement a failure budget, leaving [`ALWAYS`] untouched
    fn consume_failure(budget: &AtomicUsize) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                ALWAYS => Some(ALWAYS),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl Cluster for MemoryCluster {
    fn register_event_handler(&self, handler: Arc<dyn EventHandler>) -> Result<()> {
        self.handlers
            .write()
            .map_err(|_| WatchdogError::Lock("Failed to acquire write lock".to_string()))?
            .push(handler);
        Ok(())
    }

    fn engines(&self) -> Vec<Arc<dyn Engine>> {
        self.memory_engines()
            .into_iter()
            .map(|e| e as Arc<dyn Engine>)
            .collect()
    }

    fn containers(&self) -> Vec<Container> {
        self.memory_engines()
            .iter()
            .flat_map(|e| e.containers())
            .collect()
    }

    fn networks(&self) -> Networks {
        let networks = self
            .networks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let engine_count = self.memory_engines().len().max(1);

        // every engine reports the cluster-wide networks it is part of
        networks
            .into_iter()
            .flat_map(|n| {
                let copies = if n.scope.is_cluster_wide() { engine_count } else { 1 };
                std::iter::repeat(n).take(copies)
            })
            .collect()
    }

    async fn create_container(&self, config: ContainerConfig, name: &str) -> Result<Placement> {
        if Self::consume_failure(&self.create_failures) {
            return Err(WatchdogError::Container(format!(
                "no resources available to schedule container {}",
                name
            )));
        }

        let taken = self.containers().iter().any(|c| c.info.name == name);
        if taken {
            return Err(WatchdogError::Container(format!(
                "name {} is already in use",
                name
            )));
        }

        let engine = self
            .memory_engines()
            .into_iter()
            .filter(|e| e.is_healthy())
            .min_by_key(|e| e.tracked_count())
            .ok_or(WatchdogError::NoHealthyEngine)?;

        let id = Uuid::new_v4().to_string().replace("-", "")[..12].to_string();
        let container = Container {
            id,
            engine: engine.engine_ref(),
            config: config.clone(),
            info: ContainerInfo {
                name: name.to_string(),
                network_settings: NetworkSettings {
                    networks: config.networking_config.endpoints_config.clone(),
                },
                ..ContainerInfo::default()
            },
        };
        let container = engine.run(container);

        self.created
            .lock()
            .map_err(|_| WatchdogError::Lock("Failed to acquire creation log lock".to_string()))?
            .push(CreateRequest {
                name: name.to_string(),
                config,
            });

        Ok(Placement {
            container,
            engine: engine as Arc<dyn Engine>,
        })
    }

    async fn start_container(&self, container: &Container) -> Result<()> {
        self.start_attempts.fetch_add(1, Ordering::SeqCst);

        if Self::consume_failure(&self.start_failures) {
            return Err(WatchdogError::Container(format!(
                "container {} failed to start",
                container.id
            )));
        }

        let engine = self
            .engine(&container.engine.id)
            .ok_or_else(|| WatchdogError::EngineNotFound(container.engine.id.clone()))?;
        engine.mark_running(&container.id)?;

        self.started
            .lock()
            .map_err(|_| WatchdogError::Lock("Failed to acquire start log lock".to_string()))?
            .push(container.id.clone());
        Ok(())
    }

    fn pick_healthy_engine(&self) -> Result<Arc<dyn Engine>> {
        let healthy: Vec<Arc<MemoryEngine>> = self
            .memory_engines()
            .into_iter()
            .filter(|e| e.is_healthy())
            .collect();

        healthy
            .choose(&mut rand::thread_rng())
            .cloned()
            .map(|e| e as Arc<dyn Engine>)
            .ok_or(WatchdogError::NoHealthyEngine)
    }
}

/// One engine in a [`ClusterSnapshot`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
    #[serde(default)]
    pub containers: Vec<Container>,
}

fn default_healthy() -> bool {
    true
}

/// Serializable cluster state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub engines: Vec<EngineSnapshot>,
    #[serde(default)]
    pub networks: Vec<NetworkDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web(id: &str) -> Container {
        Container::new(id, "/web", EngineRef::default(), ContainerConfig::new("nginx"))
    }

    #[tokio::test]
    async fn test_refresh_replaces_bookkeeping() {
        let engine = MemoryEngine::new("e1", "node-1");
        engine.run(web("a"));
        engine.run_untracked(web("b"));
        assert_eq!(engine.containers().len(), 1);

        engine.refresh_containers(false).await.unwrap();
        let ids: Vec<String> = engine.containers().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_remove_running_requires_force() {
        let engine = MemoryEngine::new("e1", "node-1");
        let container = engine.run(web("a").with_state(true, 0, 0));

        assert!(engine.remove_container(&container, false, false).await.is_err());
        engine.remove_container(&container, true, true).await.unwrap();
        assert!(engine.containers().is_empty());
        assert!(engine.live_containers().is_empty());
        assert_eq!(engine.removed(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name() {
        let cluster = MemoryCluster::new();
        let engine = Arc::new(MemoryEngine::new("e1", "node-1"));
        engine.run(web("a"));
        cluster.add_engine(engine);

        let result = cluster.create_container(ContainerConfig::new("nginx"), "/web").await;
        assert!(matches!(result, Err(WatchdogError::Container(_))));
    }

    #[tokio::test]
    async fn test_create_places_on_healthy_engine() {
        let cluster = MemoryCluster::new();
        let down = Arc::new(MemoryEngine::new("e1", "node-1"));
        down.set_healthy(false);
        cluster.add_engine(down);
        cluster.add_engine(Arc::new(MemoryEngine::new("e2", "node-2")));

        let placement = cluster
            .create_container(ContainerConfig::new("nginx"), "/web")
            .await
            .unwrap();
        assert_eq!(placement.engine.id(), "e2");
        assert_eq!(placement.container.engine.id, "e2");
        assert_eq!(cluster.created().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_budgets() {
        let cluster = MemoryCluster::new();
        let engine = Arc::new(MemoryEngine::new("e1", "node-1"));
        let container = engine.run(web("a"));
        cluster.add_engine(engine.clone());

        cluster.fail_next_starts(1);
        assert!(cluster.start_container(&container).await.is_err());
        assert!(cluster.start_container(&container).await.is_ok());
        assert_eq!(cluster.start_attempts(), 2);
        assert!(engine.containers()[0].info.state.running);

        cluster.fail_next_starts(ALWAYS);
        for _ in 0..3 {
            assert!(cluster.start_container(&container).await.is_err());
        }
    }

    #[test]
    fn test_pick_healthy_engine() {
        let cluster = MemoryCluster::new();
        assert!(matches!(
            cluster.pick_healthy_engine(),
            Err(WatchdogError::NoHealthyEngine)
        ));

        let engine = Arc::new(MemoryEngine::new("e1", "node-1"));
        cluster.add_engine(engine.clone());
        assert_eq!(cluster.pick_healthy_engine().unwrap().id(), "e1");

        engine.set_healthy(false);
        assert!(cluster.pick_healthy_engine().is_err());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let json = r#"{
            "engines": [
                {"id": "e1", "name": "node-1", "healthy": false,
                 "containers": [{"id": "a", "info": {"name": "/web"}}]},
                {"id": "e2", "name": "node-2"}
            ],
            "networks": [{"id": "n1", "name": "overlay", "scope": "swarm"}]
        }"#;
        let snapshot: ClusterSnapshot = serde_json::from_str(json).unwrap();
        let cluster = MemoryCluster::from_snapshot(snapshot);

        let engine = cluster.engine("e1").unwrap();
        assert!(!engine.is_healthy());
        assert_eq!(engine.containers()[0].engine.id, "e1");
        assert!(cluster.engine("e2").unwrap().is_healthy());
        // overlay is reported once per engine
        assert_eq!(cluster.networks().len(), 2);
        assert_eq!(cluster.networks().uniq().len(), 1);

        let again = cluster.snapshot();
        assert_eq!(again.engines.len(), 2);
        assert_eq!(again.engines[0].containers[0].info.name, "/web");
    }

    #[test]
    fn test_demo_snapshot_parses() {
        let snapshot: ClusterSnapshot =
            serde_json::from_str(include_str!("../../demos/cluster.json")).unwrap();
        let cluster = MemoryCluster::from_snapshot(snapshot);

        let web = cluster
            .containers()
            .into_iter()
            .find(|c| c.info.name == "/web")
            .unwrap();
        assert_eq!(web.config.swarm_id(), Some("b41c0e5d9a7f"));
        assert!(web
            .config
            .has_reschedule_policy(crate::container::ReschedulePolicy::OnNodeFailure));
        assert!(cluster.networks().uniq().get("frontend").unwrap().has_subnet());
    }
}
