//! Reschedule retry driver

use super::Watchdog;
use crate::config::WatchdogOptions;
use crate::swarm::Engine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

const BACKOFF_FACTOR: f64 = 1.5;

/// Delay before the retry following attempt `attempt` (1-based):
/// `min(max_interval, interval * 1.5^(attempt-1))`, floored to whole seconds.
pub fn backoff_delay(attempt: u32, interval: Duration, max_interval: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let secs = interval.as_secs_f64() * BACKOFF_FACTOR.powi(exponent);
    let capped = secs.min(max_interval.as_secs_f64());
    Duration::from_secs(capped.floor() as u64)
}

/// Delays for the first `attempts` retries under `options`
pub fn backoff_schedule(options: &WatchdogOptions, attempts: u32) -> Vec<Duration> {
    (1..=attempts)
        .map(|attempt| {
            backoff_delay(
                attempt,
                options.reschedule_retry_interval,
                options.reschedule_retry_max_interval,
            )
        })
        .collect()
}

impl Watchdog {
    /// Run reschedule passes for a failed engine until one completes, the
    /// retry limit is reached, or the watchdog stops
    pub(crate) async fn reschedule_containers(&self, engine: Arc<dyn Engine>) {
        let options = &self.inner.options;
        let limit = options.reschedule_retry;
        debug!(
            node = %engine.name(),
            limit,
            interval = ?options.reschedule_retry_interval,
            max_interval = ?options.reschedule_retry_max_interval,
            "Node failed, rescheduling containers"
        );

        let mut attempt: u32 = 1;
        while !self.reschedule_pass(&engine).await {
            if limit == 0 || attempt < limit {
                let delay = backoff_delay(
                    attempt,
                    options.reschedule_retry_interval,
                    options.reschedule_retry_max_interval,
                );
                debug!(
                    node = %engine.name(),
                    attempt,
                    delay = ?delay,
                    "Some containers could not be rescheduled, retrying"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            } else {
                error!(
                    node = %engine.name(),
                    "Failed to reschedule containers after {} attempt(s)",
                    limit
                );
                return;
            }
        }

        debug!(node = %engine.name(), "Container rescheduling complete");
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::swarm::memory::ALWAYS;
    use tokio::time::Instant;

    #[test]
    fn test_backoff_sequence() {
        let delays: Vec<u64> = (1..=10)
            .map(|n| backoff_delay(n, Duration::from_secs(1), Duration::from_secs(30)).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 1, 2, 3, 5, 7, 11, 17, 25, 30]);
    }

    #[test]
    fn test_backoff_is_bounded_and_monotonic() {
        let interval = Duration::from_secs(30);
        let max = Duration::from_secs(300);

        let mut previous = Duration::ZERO;
        for attempt in 1..200 {
            let delay = backoff_delay(attempt, interval, max);
            assert!(delay >= previous);
            assert!(delay <= max);
            previous = delay;
        }
        assert_eq!(backoff_delay(u32::MAX, interval, max), max);
    }

    #[test]
    fn test_backoff_schedule() {
        let options = options(0);
        let schedule: Vec<u64> = backoff_schedule(&options, 4).iter().map(|d| d.as_secs()).collect();
        assert_eq!(schedule, vec![1, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_limit() {
        let h = harness(3);
        h.failed.run(reschedulable("c1", "web"));
        h.failed.set_healthy(false);
        h.cluster.fail_next_creates(100);

        let started = Instant::now();
        h.watchdog.reschedule_containers(h.failed.clone()).await;

        // three passes with 1s + 1s between them
        assert_eq!(started.elapsed().as_secs(), 2);
        assert!(h.cluster.created().is_empty());
        assert_eq!(h.failed.containers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_retries_until_success() {
        let h = harness(0);
        h.failed.run(reschedulable("c1", "web"));
        h.failed.set_healthy(false);
        h.cluster.fail_next_creates(3);

        let started = Instant::now();
        h.watchdog.reschedule_containers(h.failed.clone()).await;

        assert_eq!(started.elapsed().as_secs(), 1 + 1 + 2);
        assert_eq!(h.cluster.created().len(), 1);
        assert!(h.failed.containers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_by_default() {
        let h = harness(1);
        h.failed.run(reschedulable("c1", "web"));
        h.failed.set_healthy(false);
        h.cluster.fail_next_creates(1);

        let started = Instant::now();
        h.watchdog.reschedule_containers(h.failed.clone()).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(h.cluster.created().is_empty());
        assert_eq!(h.failed.containers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_unbounded_retries() {
        let h = harness(0);
        h.failed.run(reschedulable("c1", "web"));
        h.failed.set_healthy(false);
        h.cluster.fail_next_creates(ALWAYS);

        let started = Instant::now();
        let driver = tokio::spawn({
            let watchdog = h.watchdog.clone();
            let engine: Arc<dyn Engine> = h.failed.clone();
            async move { watchdog.reschedule_containers(engine).await }
        });

        // passes at 0, 1, 2, 4 and 7s; stop lands in the 5s sleep before 12s
        tokio::time::sleep(Duration::from_secs(10)).await;
        h.watchdog.stop().await;
        driver.await.unwrap();

        assert_eq!(started.elapsed().as_secs(), 12);
        assert!(h.cluster.created().is_empty());
        assert_eq!(h.failed.containers().len(), 1);
    }
}
