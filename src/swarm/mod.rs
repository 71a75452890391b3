//! Swarm cluster contracts
//!
//! The watchdog consumes the cluster through the [`Cluster`], [`Engine`]
//! and [`EventHandler`] traits. [`memory`] provides an in-memory
//! implementation of all of them.

pub mod cluster;
pub mod engine;
pub mod event;
pub mod memory;

pub use cluster::{Cluster, EventHandler, Placement};
pub use engine::Engine;
pub use event::{Event, EventStatus, SWARM_EVENT_SOURCE};
pub use memory::{ClusterSnapshot, MemoryCluster, MemoryEngine, MemoryNetworkClient};
