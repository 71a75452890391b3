//! Container records as tracked by the cluster

use crate::network::config::EndpointSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Label carrying the swarm identity shared by every instance of a workload
pub const SWARM_ID_LABEL: &str = "com.docker.swarm.id";

/// Label carrying the JSON list of reschedule policies
pub const RESCHEDULE_POLICIES_LABEL: &str = "com.docker.swarm.reschedule-policies";

/// Restart policy names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicyName {
    /// Never restart
    #[default]
    No,
    /// Always restart
    Always,
    /// Restart unless stopped by the user
    UnlessStopped,
    /// Restart after a non-zero exit
    OnFailure,
}

impl std::fmt::Display for RestartPolicyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartPolicyName::No => write!(f, "no"),
            RestartPolicyName::Always => write!(f, "always"),
            RestartPolicyName::UnlessStopped => write!(f, "unless-stopped"),
            RestartPolicyName::OnFailure => write!(f, "on-failure"),
        }
    }
}

/// Container restart policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    #[serde(default)]
    pub name: RestartPolicyName,
    #[serde(default)]
    pub maximum_retry_count: u32,
}

impl RestartPolicy {
    /// `always` policy
    pub fn always() -> Self {
        Self {
            name: RestartPolicyName::Always,
            maximum_retry_count: 0,
        }
    }

    /// `on-failure` policy with a retry cap
    pub fn on_failure(maximum_retry_count: u32) -> Self {
        Self {
            name: RestartPolicyName::OnFailure,
            maximum_retry_count,
        }
    }

    /// `unless-stopped` policy
    pub fn unless_stopped() -> Self {
        Self {
            name: RestartPolicyName::UnlessStopped,
            maximum_retry_count: 0,
        }
    }

    pub fn is_always(&self) -> bool {
        self.name == RestartPolicyName::Always
    }

    pub fn is_on_failure(&self) -> bool {
        self.name == RestartPolicyName::OnFailure
    }
}

/// Reschedule policies a container can opt into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReschedulePolicy {
    /// Leave the container where it is
    Off,
    /// Move the container when its node fails
    OnNodeFailure,
}

impl std::fmt::Display for ReschedulePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReschedulePolicy::Off => write!(f, "off"),
            ReschedulePolicy::OnNodeFailure => write!(f, "on-node-failure"),
        }
    }
}

/// Host configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

/// Networks requested at creation time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkingConfig {
    /// Endpoint settings keyed by network name
    #[serde(default)]
    pub endpoints_config: HashMap<String, EndpointSettings>,
}

/// Configuration a container was created from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image name/tag
    #[serde(default)]
    pub image: String,
    /// Container labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Host configuration
    #[serde(default)]
    pub host_config: HostConfig,
    /// Networking configuration
    #[serde(default)]
    pub networking_config: NetworkingConfig,
}

impl ContainerConfig {
    /// Create a configuration for an image
    pub fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
            ..Self::default()
        }
    }

    /// Swarm identity, `None` for containers outside the swarm
    pub fn swarm_id(&self) -> Option<&str> {
        self.labels
            .get(SWARM_ID_LABEL)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Reschedule policies declared on the container. A malformed label
    /// yields no policies.
    pub fn reschedule_policies(&self) -> Vec<ReschedulePolicy> {
        self.labels
            .get(RESCHEDULE_POLICIES_LABEL)
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| match name.as_str() {
                        "on-node-failure" => Some(ReschedulePolicy::OnNodeFailure),
                        "off" => Some(ReschedulePolicy::Off),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_reschedule_policy(&self, policy: ReschedulePolicy) -> bool {
        self.reschedule_policies().contains(&policy)
    }

    /// Set the swarm identity
    pub fn swarm_id_label(mut self, id: &str) -> Self {
        self.labels.insert(SWARM_ID_LABEL.to_string(), id.to_string());
        self
    }

    /// Set the reschedule policies
    pub fn reschedule(mut self, policies: &[ReschedulePolicy]) -> Self {
        let names: Vec<String> = policies.iter().map(|p| p.to_string()).collect();
        self.labels.insert(
            RESCHEDULE_POLICIES_LABEL.to_string(),
            serde_json::to_string(&names).unwrap_or_else(|_| "[]".to_string()),
        );
        self
    }

    /// Set the restart policy
    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.host_config.restart_policy = policy;
        self
    }

    /// Request a network at creation time
    pub fn endpoint(mut self, network: &str, endpoint: EndpointSettings) -> Self {
        self.networking_config
            .endpoints_config
            .insert(network.to_string(), endpoint);
        self
    }
}

/// Last observed runtime state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub exit_code: i64,
}

/// Network state reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Attached endpoints keyed by network name
    #[serde(default)]
    pub networks: HashMap<String, EndpointSettings>,
}

/// Runtime information about a container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Name as reported by the engine, usually with a leading `/`
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub network_settings: NetworkSettings,
}

/// Reference to the engine a container is placed on
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineRef {
    pub id: String,
    pub name: String,
}

impl EngineRef {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// A container placed on an engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    #[serde(default)]
    pub engine: EngineRef,
    #[serde(default)]
    pub config: ContainerConfig,
    #[serde(default)]
    pub info: ContainerInfo,
}

impl Container {
    /// Create a container record
    pub fn new(id: &str, name: &str, engine: EngineRef, config: ContainerConfig) -> Self {
        Self {
            id: id.to_string(),
            engine,
            config,
            info: ContainerInfo {
                name: name.to_string(),
                ..ContainerInfo::default()
            },
        }
    }

    /// Name without the leading `/`, `None` if the container has no usable
    /// name
    pub fn display_name(&self) -> Option<&str> {
        let name = self.info.name.strip_prefix('/').unwrap_or(&self.info.name);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    /// Record an attached network endpoint
    pub fn attach(mut self, network: &str, endpoint: EndpointSettings) -> Self {
        self.info
            .network_settings
            .networks
            .insert(network.to_string(), endpoint);
        self
    }

    /// Set the last observed state
    pub fn with_state(mut self, running: bool, exit_code: i64, restart_count: u32) -> Self {
        self.info.state = ContainerState { running, exit_code };
        self.info.restart_count = restart_count;
        self
    }
}
