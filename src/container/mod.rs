//! Container records and restart policy evaluation

pub mod config;
pub mod policy;

pub use config::{
    Container, ContainerConfig, ContainerInfo, ContainerState, EngineRef, HostConfig,
    NetworkSettings, NetworkingConfig, ReschedulePolicy, RestartPolicy, RestartPolicyName,
};
pub use policy::should_restart;
