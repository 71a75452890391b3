//! Duplicate removal for reconnecting engines

use super::Watchdog;
use crate::swarm::Engine;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl Watchdog {
    /// Remove containers on `engine` that also exist, under the same swarm
    /// ID, on another engine.
    ///
    /// Once a node is back, the copy the manager rescheduled elsewhere wins
    /// and the node's own copy is force-removed with its volumes.
    pub(crate) async fn remove_duplicate_containers(&self, engine: Arc<dyn Engine>) {
        debug!(node = %engine.name(), "Removing duplicate containers");

        if let Err(e) = engine.refresh_containers(false).await {
            warn!(
                node = %engine.name(),
                "Failed to refresh containers, checking the last known list: {}",
                e
            );
        }

        let _state = self.inner.state.lock().await;
        let cluster_containers = self.inner.cluster.containers();

        for container in engine.containers() {
            let Some(swarm_id) = container.config.swarm_id() else {
                continue;
            };

            let duplicate = cluster_containers.iter().find(|other| {
                other.engine.id != engine.id() && other.config.swarm_id() == Some(swarm_id)
            });
            let Some(duplicate) = duplicate else {
                continue;
            };

            info!(
                container = %container.id,
                duplicate = %duplicate.id,
                node = %engine.name(),
                other_node = %duplicate.engine.name,
                "Container is rescheduled on another node, removing this copy"
            );
            if let Err(e) = engine.remove_container(&container, true, true).await {
                error!(container = %container.id, "Failed to remove duplicate container: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use crate::container::{Container, ContainerConfig, EngineRef};
    use crate::swarm::Engine;

    /// e2 runs the rescheduled copy of c1; e1 comes back with the original
    fn rejoined(h: &Harness) {
        let original = reschedulable("c1", "web").with_state(true, 0, 0);
        let mut replacement = original.clone();
        replacement.id = "n1".to_string();
        h.healthy.run(replacement);
        h.failed.run_untracked(original);
    }

    #[tokio::test]
    async fn test_removes_copy_that_exists_elsewhere() {
        let h = harness(1);
        rejoined(&h);

        h.watchdog.remove_duplicate_containers(h.failed.clone()).await;

        assert_eq!(h.failed.removed(), vec!["c1"]);
        assert!(h.failed.live_containers().is_empty());
        assert_eq!(h.healthy.containers().len(), 1);
        assert!(h.healthy.removed().is_empty());
    }

    #[tokio::test]
    async fn test_second_scan_is_a_no_op() {
        let h = harness(1);
        rejoined(&h);

        h.watchdog.remove_duplicate_containers(h.failed.clone()).await;
        h.watchdog.remove_duplicate_containers(h.failed.clone()).await;

        assert_eq!(h.failed.removed(), vec!["c1"]);
    }

    #[tokio::test]
    async fn test_keeps_unique_and_unlabelled_containers() {
        let h = harness(1);
        h.failed.run_untracked(reschedulable("c1", "web"));
        h.failed.run_untracked(Container::new(
            "c2",
            "/db",
            EngineRef::default(),
            ContainerConfig::new("postgres"),
        ));

        h.watchdog.remove_duplicate_containers(h.failed.clone()).await;

        assert!(h.failed.removed().is_empty());
        assert_eq!(h.failed.containers().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_uses_known_list() {
        let h = harness(1);
        let original = reschedulable("c1", "web");
        let mut replacement = original.clone();
        replacement.id = "n1".to_string();
        h.healthy.run(replacement);
        h.failed.run(original);
        h.failed.fail_refresh(true);

        h.watchdog.remove_duplicate_containers(h.failed.clone()).await;
        assert_eq!(h.failed.removed(), vec!["c1"]);
    }

    #[tokio::test]
    async fn test_removal_failure_does_not_stop_the_scan() {
        let h = harness(1);
        for (id, name) in [("c1", "web"), ("c2", "api")] {
            let original = reschedulable(id, name);
            let mut replacement = original.clone();
            replacement.id = format!("n-{}", id);
            h.healthy.run(replacement);
            h.failed.run_untracked(original);
        }
        // containers are scanned in id order, so c1 fails first
        h.failed.fail_removal_of("c1");

        h.watchdog.remove_duplicate_containers(h.failed.clone()).await;

        assert_eq!(h.failed.removed(), vec!["c2"]);
        let left: Vec<String> = h.failed.live_containers().into_iter().map(|c| c.id).collect();
        assert_eq!(left, vec!["c1"]);
    }
}
