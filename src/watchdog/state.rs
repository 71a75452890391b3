//! State shared by every watchdog task
//!
//! All bookkeeping mutations (duplicate scans, reschedule passes, restart
//! attempts) and `stop` run while holding the guard returned by
//! [`SharedState::lock`]. Holding the guard is the only way to read or
//! change the running flag.

use tokio::sync::{Mutex, MutexGuard};

/// Orchestrator state guarded by the watchdog lock
#[derive(Debug)]
pub struct OrchestratorState {
    running: bool,
}

impl OrchestratorState {
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }
}

/// Exclusive-access wrapper around [`OrchestratorState`]
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<OrchestratorState>,
}

impl SharedState {
    /// Create state for a running watchdog
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(OrchestratorState { running: true }),
        }
    }

    /// Enter the exclusive region
    pub async fn lock(&self) -> MutexGuard<'_, OrchestratorState> {
        self.inner.lock().await
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_clears_running() {
        let state = SharedState::new();
        assert!(state.lock().await.is_running());

        state.lock().await.stop();
        assert!(!state.lock().await.is_running());
    }
}
