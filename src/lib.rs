//! Rune Watchdog - keeps Swarm containers running across node failures
//!
//! The watchdog listens to engine lifecycle events from a Swarm cluster and:
//!
//! - Reschedules containers with the `on-node-failure` policy off failed
//!   engines, retrying with exponential backoff
//! - Moves their global and swarm network endpoints to the new placement
//! - Restarts rescheduled containers according to their restart policy
//! - Removes stale copies from engines that reconnect

pub mod config;
pub mod container;
pub mod error;
pub mod logging;
pub mod network;
pub mod swarm;
pub mod watchdog;

pub use config::WatchdogOptions;
pub use error::{Result, WatchdogError};
pub use watchdog::Watchdog;
