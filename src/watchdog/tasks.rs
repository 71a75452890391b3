//! Supervised background tasks
//!
//! Every task the watchdog starts goes through a [`TaskGroup`]. Finished
//! tasks are reaped on each spawn; panics and cancellations are logged and
//! kept so [`TaskGroup::wait_idle`] can report them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error};

/// A background task that did not finish normally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Task name given at spawn time
    pub task: String,
    /// Panic message, or `cancelled`
    pub message: String,
}

#[derive(Default)]
struct Tasks {
    set: JoinSet<()>,
    names: HashMap<Id, String>,
    failures: Vec<TaskFailure>,
}

impl Tasks {
    fn reap(&mut self) {
        while let Some(result) = self.set.try_join_next_with_id() {
            record(result, &mut self.names, &mut self.failures);
        }
    }
}

/// Group of detached tasks bound to one runtime
pub struct TaskGroup {
    runtime: Handle,
    tasks: Mutex<Tasks>,
}

impl TaskGroup {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: Mutex::new(Tasks::default()),
        }
    }

    /// Spawn a named task. Never blocks.
    pub fn spawn<F>(&self, name: String, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock();
        tasks.reap();

        let handle = tasks.set.spawn_on(task, &self.runtime);
        debug!(task = %name, "Spawned background task");
        tasks.names.insert(handle.id(), name);
    }

    /// Number of tasks not yet reaped
    pub fn len(&self) -> usize {
        self.lock().set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until no task is left, including tasks spawned while waiting,
    /// and return every failure seen since the last call.
    ///
    /// Dropping the returned future before it completes aborts the tasks
    /// it was waiting on.
    pub async fn wait_idle(&self) -> Vec<TaskFailure> {
        let mut failures = std::mem::take(&mut self.lock().failures);

        loop {
            let (mut set, mut names) = {
                let mut tasks = self.lock();
                (
                    std::mem::take(&mut tasks.set),
                    std::mem::take(&mut tasks.names),
                )
            };
            if set.is_empty() {
                break;
            }

            while let Some(result) = set.join_next_with_id().await {
                record(result, &mut names, &mut failures);
            }
        }

        failures.append(&mut self.lock().failures);
        failures
    }

    fn lock(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn record(
    result: Result<(Id, ()), JoinError>,
    names: &mut HashMap<Id, String>,
    failures: &mut Vec<TaskFailure>,
) {
    match result {
        Ok((id, ())) => {
            names.remove(&id);
        }
        Err(err) => {
            let task = names
                .remove(&err.id())
                .unwrap_or_else(|| "unknown".to_string());
            let message = failure_message(err);
            error!(task = %task, "Background task failed: {}", message);
            failures.push(TaskFailure { task, message });
        }
    }
}

fn failure_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "cancelled".to_string();
    }

    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panicked".to_string()),
        Err(_) => "failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle_drains_tasks() {
        let group = TaskGroup::new(Handle::current());
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let counter = counter.clone();
            group.spawn(format!("task-{}", i), async move {
                tokio::time::sleep(Duration::from_secs(i)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(group.wait_idle().await.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn test_panics_are_reported() {
        let group = TaskGroup::new(Handle::current());
        group.spawn("exploding".to_string(), async {
            panic!("boom");
        });
        group.spawn("quiet".to_string(), async {});

        let failures = group.wait_idle().await;
        assert_eq!(
            failures,
            vec![TaskFailure {
                task: "exploding".to_string(),
                message: "boom".to_string(),
            }]
        );
        assert!(group.wait_idle().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_nested_spawns() {
        let group = Arc::new(TaskGroup::new(Handle::current()));
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_group = group.clone();
        let inner_counter = counter.clone();
        group.spawn("outer".to_string(), async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let counter = inner_counter.clone();
            inner_group.spawn("inner".to_string(), async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert!(group.wait_idle().await.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
