//! Restart decision for rescheduled containers

use super::config::Container;
use tracing::debug;

/// Whether a container should be started after it has been rescheduled,
/// based on its last known state and restart policy.
///
/// `unless-stopped` containers are not restarted: the watchdog cannot tell
/// a user-initiated stop from a crash.
pub fn should_restart(container: &Container) -> bool {
    if container.info.state.running {
        debug!(
            container = %container.id,
            name = %container.info.name,
            "Container was running and should be restarted"
        );
        return true;
    }

    let policy = &container.config.host_config.restart_policy;
    let restart = if policy.is_always() {
        true
    } else {
        policy.is_on_failure()
            && container.info.state.exit_code != 0
            && container.info.restart_count < policy.maximum_retry_count
    };

    debug!(
        container = %container.id,
        name = %container.info.name,
        policy = %policy.name,
        restart,
        "Evaluated restart policy"
    );
    restart
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::config::{ContainerConfig, EngineRef, RestartPolicy};

    fn container(policy: RestartPolicy, running: bool, exit_code: i64, restarts: u32) -> Container {
        Container::new(
            "c1",
            "/app",
            EngineRef::new("e1", "node-1"),
            ContainerConfig::new("app").restart_policy(policy),
        )
        .with_state(running, exit_code, restarts)
    }

    #[test]
    fn test_running_always_restarts() {
        assert!(should_restart(&container(RestartPolicy::default(), true, 0, 0)));
        assert!(should_restart(&container(RestartPolicy::unless_stopped(), true, 0, 0)));
    }

    #[test]
    fn test_always_policy() {
        assert!(should_restart(&container(RestartPolicy::always(), false, 0, 0)));
    }

    #[test]
    fn test_on_failure_policy() {
        // clean exit
        assert!(!should_restart(&container(RestartPolicy::on_failure(3), false, 0, 0)));
        // failed, retries left
        assert!(should_restart(&container(RestartPolicy::on_failure(3), false, 1, 2)));
        // failed, retries exhausted
        assert!(!should_restart(&container(RestartPolicy::on_failure(3), false, 1, 3)));
    }

    #[test]
    fn test_no_and_unless_stopped() {
        assert!(!should_restart(&container(RestartPolicy::default(), false, 1, 0)));
        assert!(!should_restart(&container(RestartPolicy::unless_stopped(), false, 137, 0)));
    }
}
