//! Cluster lifecycle events

use super::engine::Engine;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;

/// Source tag of events emitted by the swarm subsystem itself
pub const SWARM_EVENT_SOURCE: &str = "swarm";

/// What happened to an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    /// Engine joined the cluster
    EngineConnect,
    /// Engine became reachable again after a disconnect
    EngineReconnect,
    /// Engine stopped responding
    EngineDisconnect,
    /// Any other status, carried verbatim
    Other(String),
}

impl FromStr for EventStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "engine_connect" => EventStatus::EngineConnect,
            "engine_reconnect" => EventStatus::EngineReconnect,
            "engine_disconnect" => EventStatus::EngineDisconnect,
            other => EventStatus::Other(other.to_string()),
        })
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::EngineConnect => write!(f, "engine_connect"),
            EventStatus::EngineReconnect => write!(f, "engine_reconnect"),
            EventStatus::EngineDisconnect => write!(f, "engine_disconnect"),
            EventStatus::Other(status) => write!(f, "{}", status),
        }
    }
}

/// An event delivered to cluster event handlers
#[derive(Clone)]
pub struct Event {
    /// Subsystem that emitted the event
    pub from: String,
    /// What happened
    pub status: EventStatus,
    /// Engine the event is about
    pub engine: Arc<dyn Engine>,
    /// When it happened
    pub time: DateTime<Utc>,
}

impl Event {
    /// Create a swarm event
    pub fn new(status: EventStatus, engine: Arc<dyn Engine>) -> Self {
        Self::from_source(SWARM_EVENT_SOURCE, status, engine)
    }

    /// Create an event from an arbitrary source
    pub fn from_source(from: &str, status: EventStatus, engine: Arc<dyn Engine>) -> Self {
        Self {
            from: from.to_string(),
            status,
            engine,
            time: Utc::now(),
        }
    }

    /// Whether the event was emitted by the swarm subsystem
    pub fn is_from_swarm(&self) -> bool {
        self.from == SWARM_EVENT_SOURCE
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("from", &self.from)
            .field("status", &self.status)
            .field("engine", &self.engine.id())
            .field("time", &self.time)
            .finish()
    }
}
