//! Network descriptors, the endpoint client contract, and endpoint
//! migration for rescheduled containers.

pub mod client;
pub mod config;
pub mod migration;

pub use client::{NetworkClient, NETWORK_OPERATION_TIMEOUT};
pub use config::{EndpointSettings, NetworkDescriptor, NetworkScope, Networks};
pub use migration::{EndpointState, NetworkMigration};
