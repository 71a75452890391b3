//! Moving cluster-wide network endpoints along with a rescheduled container
//!
//! Endpoints on local networks are recreated by the new placement from the
//! creation-time configuration. Endpoints on global/swarm networks are not:
//! they are detached from the old container by name, left out of the
//! creation request, and reattached one by one once the replacement exists.
//!
//! ```text
//!  AttachedOld ──detach──▶ DetachedPending ──reattach──▶ AttachedNew
//!       ▲                        │
//!       └─────────undo───────────┘
//! ```

use super::client::{connect_with_timeout, disconnect_with_timeout, NetworkClient};
use super::config::{EndpointSettings, Networks};
use crate::container::Container;
use tracing::{debug, warn};

/// Where a migrating endpoint currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Still recorded on the original container
    AttachedOld,
    /// Removed from the original container, not yet on the replacement
    DetachedPending,
    /// Connected to the replacement container
    AttachedNew,
}

/// One cluster-wide endpoint being migrated
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointMigration {
    /// Network name the endpoint is keyed by
    pub network: String,
    /// Endpoint settings as recorded on the original container
    pub settings: EndpointSettings,
    pub state: EndpointState,
}

/// Migration plan for the cluster-wide endpoints of one container
#[derive(Debug, Clone, Default)]
pub struct NetworkMigration {
    endpoints: Vec<EndpointMigration>,
    /// Creation-time entries removed by [`Self::strip_creation_config`]
    stripped: Vec<(String, EndpointSettings)>,
}

impl NetworkMigration {
    /// Collect the container's endpoints that sit on global or swarm scoped
    /// networks
    pub fn plan(container: &Container, networks: &Networks) -> Self {
        let mut endpoints: Vec<EndpointMigration> = container
            .info
            .network_settings
            .networks
            .iter()
            .filter(|(name, endpoint)| {
                networks
                    .resolve(name, endpoint)
                    .map(|n| n.scope.is_cluster_wide())
                    .unwrap_or(false)
            })
            .map(|(name, endpoint)| EndpointMigration {
                network: name.clone(),
                settings: endpoint.clone(),
                state: EndpointState::AttachedOld,
            })
            .collect();
        endpoints.sort_by(|a, b| a.network.cmp(&b.network));

        Self {
            endpoints,
            stripped: Vec::new(),
        }
    }

    /// Whether the container has no cluster-wide endpoints
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[EndpointMigration] {
        &self.endpoints
    }

    /// Number of endpoints in the given state
    pub fn count(&self, state: EndpointState) -> usize {
        self.endpoints.iter().filter(|e| e.state == state).count()
    }

    /// Force-disconnect every endpoint from the old container through a
    /// worker engine. A failed call is not fatal (the endpoint may already be
    /// gone); the endpoint is considered detached either way.
    pub async fn detach(&mut self, worker: &dyn NetworkClient, container_name: &str) {
        for endpoint in self
            .endpoints
            .iter_mut()
            .filter(|e| e.state == EndpointState::AttachedOld)
        {
            debug!(
                container = %container_name,
                network = %endpoint.network,
                "Disconnecting container from network"
            );
            if let Err(e) = disconnect_with_timeout(worker, &endpoint.network, container_name).await
            {
                warn!(
                    container = %container_name,
                    network = %endpoint.network,
                    "Failed to remove network endpoint from old container: {}",
                    e
                );
            }
            endpoint.state = EndpointState::DetachedPending;
        }
    }

    /// Drop detached endpoints from the container's recorded network state
    pub fn clear_recorded(&self, container: &mut Container) {
        let networks = &mut container.info.network_settings.networks;
        for endpoint in self.pending() {
            networks.remove(&endpoint.network);
        }
    }

    /// Remove creation-time endpoints on cluster-wide networks. They are
    /// reattached individually after creation.
    pub fn strip_creation_config(&mut self, container: &mut Container, networks: &Networks) {
        let endpoints =
            std::mem::take(&mut container.config.networking_config.endpoints_config);

        for (name, endpoint) in endpoints {
            let cluster_wide = networks
                .resolve(&name, &endpoint)
                .map(|n| n.scope.is_cluster_wide())
                .unwrap_or(false);

            if cluster_wide {
                self.stripped.push((name, endpoint));
            } else {
                container
                    .config
                    .networking_config
                    .endpoints_config
                    .insert(name, endpoint);
            }
        }
    }

    /// Put every detached endpoint back on the original container, in both
    /// its recorded network state and its creation-time configuration.
    pub fn undo(&mut self, container: &mut Container) {
        let endpoints_config = &mut container.config.networking_config.endpoints_config;
        for (name, endpoint) in self.stripped.drain(..) {
            endpoints_config.insert(name, endpoint);
        }

        for endpoint in self
            .endpoints
            .iter_mut()
            .filter(|e| e.state == EndpointState::DetachedPending)
        {
            container
                .info
                .network_settings
                .networks
                .insert(endpoint.network.clone(), endpoint.settings.clone());
            container
                .config
                .networking_config
                .endpoints_config
                .entry(endpoint.network.clone())
                .or_insert_with(|| endpoint.settings.clone());
            endpoint.state = EndpointState::AttachedOld;
        }
    }

    /// Connect each detached endpoint to the replacement container. Static
    /// addresses are dropped for networks without a subnet. Failures are
    /// logged and leave the endpoint pending.
    pub async fn reattach(
        &mut self,
        client: &dyn NetworkClient,
        container_name: &str,
        networks: &Networks,
    ) {
        for endpoint in self
            .endpoints
            .iter_mut()
            .filter(|e| e.state == EndpointState::DetachedPending)
        {
            let has_subnet = networks
                .get(&endpoint.network)
                .map(|n| n.has_subnet())
                .unwrap_or(false);
            if !has_subnet {
                endpoint.settings.clear_static_addresses();
            }

            debug!(
                container = %container_name,
                network = %endpoint.network,
                "Connecting container to network"
            );
            match connect_with_timeout(client, &endpoint.network, container_name, &endpoint.settings)
                .await
            {
                Ok(()) => endpoint.state = EndpointState::AttachedNew,
                Err(e) => warn!(
                    container = %container_name,
                    network = %endpoint.network,
                    "Failed to connect network to container: {}",
                    e
                ),
            }
        }
    }

    fn pending(&self) -> impl Iterator<Item = &EndpointMigration> {
        self.endpoints
            .iter()
            .filter(|e| e.state == EndpointState::DetachedPending)
    }
}
