//! Cluster watchdog
//!
//! Reacts to engine lifecycle events. A disconnected engine gets its
//! reschedulable containers recreated elsewhere, with retries and
//! exponential backoff. A (re)connected engine gets any container that now
//! also exists on another engine removed.
//!
//! All work runs on background tasks owned by the watchdog; event handling
//! itself never blocks.

mod reconcile;
mod reschedule;
mod restart;
mod retry;
mod state;
mod tasks;

pub use retry::{backoff_delay, backoff_schedule};
pub use state::{OrchestratorState, SharedState};
pub use tasks::{TaskFailure, TaskGroup};

use crate::config::WatchdogOptions;
use crate::container::Container;
use crate::error::{Result, WatchdogError};
use crate::swarm::{Cluster, Engine, Event, EventHandler, EventStatus};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, info_span, Instrument};

struct Inner {
    cluster: Arc<dyn Cluster>,
    options: WatchdogOptions,
    state: SharedState,
    tasks: TaskGroup,
}

/// Watches engine events and keeps containers scheduled on healthy engines
#[derive(Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
}

impl Watchdog {
    /// Create a watchdog and register it with the cluster.
    ///
    /// Must be called from within a Tokio runtime. Engines that are already
    /// unhealthy get a reschedule driver right away.
    pub fn new(cluster: Arc<dyn Cluster>, options: WatchdogOptions) -> Result<Self> {
        options.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            WatchdogError::Runtime(format!("watchdog must be created inside a Tokio runtime: {}", e))
        })?;

        debug!(
            retry = options.reschedule_retry,
            interval = ?options.reschedule_retry_interval,
            max_interval = ?options.reschedule_retry_max_interval,
            "Watchdog enabled"
        );

        let watchdog = Self {
            inner: Arc::new(Inner {
                cluster: cluster.clone(),
                options,
                state: SharedState::new(),
                tasks: TaskGroup::new(runtime),
            }),
        };

        cluster.register_event_handler(Arc::new(EventRelay {
            watchdog: Arc::downgrade(&watchdog.inner),
        }))?;

        for engine in cluster.engines() {
            if !engine.is_healthy() {
                info!(node = %engine.name(), "Engine is unhealthy at startup");
                watchdog.spawn_reschedule(engine);
            }
        }

        Ok(watchdog)
    }

    /// Stop the watchdog. Waits for any in-progress pass to finish; passes
    /// and restart attempts that run afterwards do nothing.
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        state.stop();
        info!("Watchdog stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.is_running()
    }

    pub fn options(&self) -> &WatchdogOptions {
        &self.inner.options
    }

    /// Number of background tasks still tracked
    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Wait for every background task, including ones spawned meanwhile.
    /// Returns tasks that panicked or were cancelled.
    pub async fn wait_idle(&self) -> Vec<TaskFailure> {
        self.inner.tasks.wait_idle().await
    }

    fn spawn_reschedule(&self, engine: Arc<dyn Engine>) {
        let span = info_span!("reschedule", node = %engine.name());
        let name = format!("reschedule {}", engine.id());
        let watchdog = self.clone();
        self.inner.tasks.spawn(
            name,
            async move { watchdog.reschedule_containers(engine).await }.instrument(span),
        );
    }

    fn spawn_reconcile(&self, engine: Arc<dyn Engine>) {
        let span = info_span!("reconcile", node = %engine.name());
        let name = format!("reconcile {}", engine.id());
        let watchdog = self.clone();
        self.inner.tasks.spawn(
            name,
            async move { watchdog.remove_duplicate_containers(engine).await }.instrument(span),
        );
    }

    fn spawn_restart(&self, container: Container) {
        let span = info_span!("restart", container = %container.id);
        let name = format!("restart {}", container.id);
        let watchdog = self.clone();
        self.inner.tasks.spawn(
            name,
            async move { watchdog.restart_container(container).await }.instrument(span),
        );
    }
}

impl EventHandler for Watchdog {
    fn handle(&self, event: &Event) -> Result<()> {
        if !event.is_from_swarm() {
            return Ok(());
        }

        match &event.status {
            EventStatus::EngineConnect | EventStatus::EngineReconnect => {
                debug!(node = %event.engine.name(), status = %event.status, "Engine connected");
                self.spawn_reconcile(event.engine.clone());
            }
            EventStatus::EngineDisconnect => {
                info!(node = %event.engine.name(), "Engine disconnected");
                self.spawn_reschedule(event.engine.clone());
            }
            EventStatus::Other(_) => {}
        }

        Ok(())
    }
}

/// Handler registered with the cluster. Holds the watchdog weakly so the
/// cluster does not keep it alive; events after the last handle is dropped
/// are ignored.
struct EventRelay {
    watchdog: Weak<Inner>,
}

impl EventHandler for EventRelay {
    fn handle(&self, event: &Event) -> Result<()> {
        match self.watchdog.upgrade() {
            Some(inner) => Watchdog { inner }.handle(event),
            None => Ok(()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::swarm::{MemoryCluster, MemoryEngine, SWARM_EVENT_SOURCE};
    use std::time::Duration;

    #[tokio::test]
    async fn test_rejects_invalid_options() {
        let cluster = Arc::new(MemoryCluster::new());
        let options =
            WatchdogOptions::new(1, Duration::from_secs(10), Duration::from_secs(5));
        assert!(matches!(
            Watchdog::new(cluster, options),
            Err(WatchdogError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_requires_runtime() {
        let cluster = Arc::new(MemoryCluster::new());
        assert!(matches!(
            Watchdog::new(cluster, options(1)),
            Err(WatchdogError::Runtime(_))
        ));
    }

    #[tokio::test]
    async fn test_ignores_events_from_other_sources() {
        let h = harness(1);
        h.failed.run(reschedulable("c1", "web"));
        h.failed.set_healthy(false);

        let event = Event::from_source("docker", EventStatus::EngineDisconnect, h.failed.clone());
        h.cluster.emit(event).unwrap();

        assert_eq!(h.watchdog.pending_tasks(), 0);
        assert!(h.watchdog.wait_idle().await.is_empty());
        assert!(h.cluster.created().is_empty());
        assert_eq!(h.failed.containers().len(), 1);
    }

    #[tokio::test]
    async fn test_ignores_unrelated_statuses() {
        let h = harness(1);
        let event = Event::from_source(
            SWARM_EVENT_SOURCE,
            EventStatus::Other("container_create".to_string()),
            h.failed.clone(),
        );
        h.cluster.emit(event).unwrap();
        assert_eq!(h.watchdog.pending_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_reschedules_containers() {
        let h = harness(1);
        h.failed.run(reschedulable("c1", "web").with_state(true, 0, 0));

        h.cluster.disconnect_engine("e1").unwrap();
        assert!(h.watchdog.wait_idle().await.is_empty());

        assert!(h.failed.containers().is_empty());
        let moved = h.healthy.containers();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].info.name, "/web");
        assert_eq!(h.cluster.started(), vec![moved[0].id.clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_scans_unhealthy_engines() {
        let cluster = Arc::new(MemoryCluster::new());
        let down = Arc::new(MemoryEngine::new("e1", "node-1"));
        down.run(reschedulable("c1", "web"));
        down.set_healthy(false);
        let up = Arc::new(MemoryEngine::new("e2", "node-2"));
        cluster.add_engine(down.clone());
        cluster.add_engine(up.clone());

        let watchdog = Watchdog::new(cluster.clone(), options(1)).unwrap();
        assert_eq!(watchdog.pending_tasks(), 1);
        assert!(watchdog.wait_idle().await.is_empty());

        assert!(down.containers().is_empty());
        assert_eq!(up.containers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_removes_stale_copy() {
        let h = harness(1);
        h.failed.run(reschedulable("c1", "web").with_state(true, 0, 0));

        h.cluster.disconnect_engine("e1").unwrap();
        h.watchdog.wait_idle().await;
        // the old copy is still on the node, the manager just stopped
        // tracking it
        assert_eq!(h.failed.live_containers().len(), 1);

        h.cluster.reconnect_engine("e1").unwrap();
        assert!(h.watchdog.wait_idle().await.is_empty());

        assert_eq!(h.failed.removed(), vec!["c1"]);
        assert!(h.failed.live_containers().is_empty());
        assert_eq!(h.healthy.containers().len(), 1);
    }

    #[tokio::test]
    async fn test_stop() {
        let h = harness(1);
        assert!(h.watchdog.is_running().await);
        h.watchdog.stop().await;
        assert!(!h.watchdog.is_running().await);
        assert_eq!(h.watchdog.options().reschedule_retry, 1);
    }

    #[tokio::test]
    async fn test_cluster_does_not_keep_watchdog_alive() {
        let h = harness(1);
        h.failed.run(reschedulable("c1", "web"));
        let inner = Arc::downgrade(&h.watchdog.inner);

        drop(h.watchdog);
        assert!(inner.upgrade().is_none());

        h.cluster.disconnect_engine("e1").unwrap();
        tokio::task::yield_now().await;
        assert!(h.cluster.created().is_empty());
        assert_eq!(h.failed.containers().len(), 1);
    }
}
