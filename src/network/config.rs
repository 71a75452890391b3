//! Network descriptors and container endpoint settings

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Network scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkScope {
    /// Local to this node
    #[default]
    Local,
    /// Swarm-wide
    Swarm,
    /// Global
    Global,
}

impl NetworkScope {
    /// Endpoints on cluster-wide networks do not follow a container to a
    /// new node on their own and must be reattached explicitly.
    pub fn is_cluster_wide(&self) -> bool {
        matches!(self, NetworkScope::Swarm | NetworkScope::Global)
    }
}

impl std::fmt::Display for NetworkScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkScope::Local => write!(f, "local"),
            NetworkScope::Swarm => write!(f, "swarm"),
            NetworkScope::Global => write!(f, "global"),
        }
    }
}

/// A network as seen by the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    /// Network ID
    pub id: String,
    /// Network name
    pub name: String,
    /// Network scope
    #[serde(default)]
    pub scope: NetworkScope,
    /// IPAM configuration
    #[serde(default)]
    pub ipam: IpamConfig,
}

impl Default for NetworkDescriptor {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string().replace("-", ""),
            name: String::new(),
            scope: NetworkScope::default(),
            ipam: IpamConfig::default(),
        }
    }
}

impl NetworkDescriptor {
    /// Create a new network descriptor
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Set network ID
    pub fn id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Set network scope
    pub fn scope(mut self, scope: NetworkScope) -> Self {
        self.scope = scope;
        self
    }

    /// Add an IPAM pool with the given subnet
    pub fn subnet(mut self, subnet: &str) -> Self {
        self.ipam.config.push(IpamPoolConfig {
            subnet: subnet.to_string(),
            gateway: None,
        });
        self
    }

    /// Whether any IPAM pool defines a subnet
    pub fn has_subnet(&self) -> bool {
        self.ipam.config.iter().any(|pool| !pool.subnet.is_empty())
    }
}

/// IPAM configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpamConfig {
    /// IP pool configurations
    #[serde(default)]
    pub config: Vec<IpamPoolConfig>,
}

/// IPAM pool configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpamPoolConfig {
    /// Subnet in CIDR format
    #[serde(default)]
    pub subnet: String,
    /// Gateway address
    #[serde(default)]
    pub gateway: Option<String>,
}

/// Static addresses requested for an endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointIpamConfig {
    #[serde(default)]
    pub ipv4_address: String,
    #[serde(default)]
    pub ipv6_address: String,
}

/// A container's attachment to one network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSettings {
    /// ID of the network this endpoint belongs to
    #[serde(default)]
    pub network_id: String,
    /// DNS aliases
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Assigned IPv4 address
    #[serde(default)]
    pub ip_address: String,
    /// Requested static addresses
    #[serde(default)]
    pub ipam_config: Option<EndpointIpamConfig>,
}

impl EndpointSettings {
    /// Create endpoint settings for a network
    pub fn new(network_id: &str) -> Self {
        Self {
            network_id: network_id.to_string(),
            ..Self::default()
        }
    }

    /// Request a static IPv4 address
    pub fn static_ipv4(mut self, address: &str) -> Self {
        self.ipam_config
            .get_or_insert_with(EndpointIpamConfig::default)
            .ipv4_address = address.to_string();
        self
    }

    /// Add a DNS alias
    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    /// Drop any requested static address
    pub fn clear_static_addresses(&mut self) {
        if let Some(ref mut ipam) = self.ipam_config {
            ipam.ipv4_address.clear();
            ipam.ipv6_address.clear();
        }
    }
}

/// A set of network descriptors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Networks(Vec<NetworkDescriptor>);

impl Networks {
    /// Create a set from descriptors
    pub fn new(networks: Vec<NetworkDescriptor>) -> Self {
        Self(networks)
    }

    /// Remove duplicate entries (the same global network is reported by
    /// every engine it spans)
    pub fn uniq(&self) -> Self {
        let mut seen = std::collections::HashSet::new();
        let networks = self
            .0
            .iter()
            .filter(|n| seen.insert(n.id.clone()))
            .cloned()
            .collect();
        Self(networks)
    }

    /// Look up a network by ID, then name, then unique ID prefix
    pub fn get(&self, key: &str) -> Option<&NetworkDescriptor> {
        if key.is_empty() {
            return None;
        }

        if let Some(network) = self.0.iter().find(|n| n.id == key) {
            return Some(network);
        }

        if let Some(network) = self.0.iter().find(|n| n.name == key) {
            return Some(network);
        }

        let mut candidates = self.0.iter().filter(|n| n.id.starts_with(key));
        match (candidates.next(), candidates.next()) {
            (Some(network), None) => Some(network),
            _ => None,
        }
    }

    /// Resolve the network of an endpoint keyed by `name` in a container's
    /// network map
    pub fn resolve(&self, name: &str, endpoint: &EndpointSettings) -> Option<&NetworkDescriptor> {
        self.get(&endpoint.network_id).or_else(|| self.get(name))
    }

    /// Number of networks
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the networks
    pub fn iter(&self) -> impl Iterator<Item = &NetworkDescriptor> {
        self.0.iter()
    }
}

impl FromIterator<NetworkDescriptor> for Networks {
    fn from_iter<I: IntoIterator<Item = NetworkDescriptor>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_descriptor_default() {
        let network = NetworkDescriptor::default();
        assert_eq!(network.scope, NetworkScope::Local);
        assert!(!network.has_subnet());
    }

    #[test]
    fn test_network_descriptor_builder() {
        let network = NetworkDescriptor::new("backend")
            .id("net1")
            .scope(NetworkScope::Swarm)
            .subnet("10.0.0.0/24");

        assert_eq!(network.name, "backend");
        assert_eq!(network.id, "net1");
        assert!(network.scope.is_cluster_wide());
        assert!(network.has_subnet());
        assert_eq!(network.ipam.config[0].subnet, "10.0.0.0/24");
    }

    #[test]
    fn test_scope_is_cluster_wide() {
        assert!(!NetworkScope::Local.is_cluster_wide());
        assert!(NetworkScope::Global.is_cluster_wide());
        assert!(NetworkScope::Swarm.is_cluster_wide());
    }

    #[test]
    fn test_networks_uniq() {
        let overlay = NetworkDescriptor::new("overlay").id("aaa111");
        let networks = Networks::new(vec![
            overlay.clone(),
            NetworkDescriptor::new("bridge").id("bbb222"),
            overlay,
        ]);

        assert_eq!(networks.len(), 3);
        assert_eq!(networks.uniq().len(), 2);
    }

    #[test]
    fn test_networks_get() {
        let networks = Networks::new(vec![
            NetworkDescriptor::new("frontend").id("abc123"),
            NetworkDescriptor::new("backend").id("abd456"),
        ]);

        assert_eq!(networks.get("abc123").unwrap().name, "frontend");
        assert_eq!(networks.get("backend").unwrap().id, "abd456");
        assert_eq!(networks.get("abd").unwrap().name, "backend");
        // ambiguous prefix
        assert!(networks.get("ab").is_none());
        assert!(networks.get("").is_none());
        assert!(networks.get("missing").is_none());
    }

    #[test]
    fn test_clear_static_addresses() {
        let mut endpoint = EndpointSettings::new("net1").static_ipv4("10.0.0.5");
        endpoint.clear_static_addresses();
        assert_eq!(endpoint.ipam_config.unwrap().ipv4_address, "");
    }
}
