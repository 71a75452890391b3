//! Single reschedule pass over a failed engine

use super::Watchdog;
use crate::container::{should_restart, Container, ReschedulePolicy};
use crate::network::NetworkMigration;
use crate::swarm::Engine;
use std::sync::Arc;
use tracing::{debug, error, info};

impl Watchdog {
    /// Recreate every reschedulable container of `engine` elsewhere.
    ///
    /// Returns `false` if at least one container could not be moved and was
    /// put back on the engine's bookkeeping. A pass after `stop` does
    /// nothing and reports completion.
    pub(crate) async fn reschedule_pass(&self, engine: &Arc<dyn Engine>) -> bool {
        let state = self.inner.state.lock().await;
        if !state.is_running() {
            debug!("Watchdog is stopped, skipping reschedule");
            return true;
        }

        let mut done = true;
        for container in engine.containers() {
            if !self.reschedule_container(engine, container).await {
                done = false;
            }
        }

        drop(state);
        done
    }

    /// Move one container. Returns `false` when it had to be put back.
    async fn reschedule_container(&self, engine: &Arc<dyn Engine>, mut container: Container) -> bool {
        if !container
            .config
            .has_reschedule_policy(ReschedulePolicy::OnNodeFailure)
        {
            debug!(container = %container.id, "Skipping container without on-node-failure policy");
            return true;
        }

        let name = match container.display_name() {
            Some(name) => name.to_string(),
            None => {
                error!(container = %container.id, "Container has no usable name, cannot reschedule");
                return true;
            }
        };

        debug!(container = %container.id, node = %engine.name(), "Rescheduling container");
        engine.forget_container(&container);

        let cluster = &self.inner.cluster;
        let networks = cluster.networks().uniq();
        let mut migration = NetworkMigration::plan(&container, &networks);

        if !migration.is_empty() {
            let worker = match cluster.pick_healthy_engine() {
                Ok(worker) => worker,
                Err(e) => {
                    error!(
                        container = %container.id,
                        "No engine available to clean up network endpoints: {}",
                        e
                    );
                    engine.add_container(container);
                    return false;
                }
            };
            migration.detach(worker.network_client().as_ref(), &name).await;
        }

        migration.clear_recorded(&mut container);
        migration.strip_creation_config(&mut container, &networks);

        let placement = match cluster
            .create_container(container.config.clone(), &container.info.name)
            .await
        {
            Ok(placement) => placement,
            Err(e) => {
                error!(
                    container = %container.id,
                    "Failed to reschedule container: {}",
                    e
                );
                migration.undo(&mut container);
                engine.add_container(container);
                return false;
            }
        };

        migration
            .reattach(placement.engine.network_client().as_ref(), &name, &networks)
            .await;

        info!(
            container = %container.id,
            new_container = %placement.container.id,
            from = %engine.name(),
            to = %placement.engine.name(),
            "Rescheduled container"
        );

        if should_restart(&container) {
            info!(container = %placement.container.id, "Starting rescheduled container");
            self.spawn_restart(placement.container);
        }

        true
    }
}
