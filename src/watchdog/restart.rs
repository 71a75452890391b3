//! Restart driver for rescheduled containers

use super::Watchdog;
use crate::container::Container;
use tracing::{debug, error, info};

impl Watchdog {
    /// Start a rescheduled container.
    ///
    /// With the default retry limit a single attempt is made. Any other
    /// limit retries every `reschedule_retry_interval` until the start
    /// succeeds or the watchdog stops. The lock is released while sleeping.
    pub(crate) async fn restart_container(&self, container: Container) {
        let options = &self.inner.options;

        loop {
            let state = self.inner.state.lock().await;
            if !state.is_running() {
                debug!(container = %container.id, "Watchdog is stopped, not starting container");
                return;
            }

            match self.inner.cluster.start_container(&container).await {
                Ok(()) => {
                    info!(container = %container.id, "Started rescheduled container");
                    return;
                }
                Err(e) => {
                    error!(container = %container.id, "Failed to start rescheduled container: {}", e);
                    if options.restart_retry_disabled() {
                        return;
                    }
                }
            }

            drop(state);
            debug!(
                container = %container.id,
                delay = ?options.reschedule_retry_interval,
                "Retrying container start"
            );
            tokio::time::sleep(options.reschedule_retry_interval).await;
        }
    }
}
