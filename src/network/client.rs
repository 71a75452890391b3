//! Network endpoint client used to move containers between networks

use super::config::EndpointSettings;
use crate::error::{Result, WatchdogError};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Deadline applied to every connect/disconnect call
pub const NETWORK_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects and disconnects container endpoints on one engine
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Detach `container` (by name or ID) from `network`
    async fn disconnect(&self, network: &str, container: &str, force: bool) -> Result<()>;

    /// Attach `container` (by name or ID) to `network`
    async fn connect(
        &self,
        network: &str,
        container: &str,
        endpoint: &EndpointSettings,
    ) -> Result<()>;
}

/// Run a network call under a deadline. Expiry surfaces as
/// [`WatchdogError::Timeout`].
pub async fn with_deadline<F>(deadline: Duration, operation: &str, call: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(WatchdogError::Timeout(format!(
            "{} did not complete within {:?}",
            operation, deadline
        ))),
    }
}

/// Disconnect with the standard deadline
pub async fn disconnect_with_timeout(
    client: &dyn NetworkClient,
    network: &str,
    container: &str,
) -> Result<()> {
    with_deadline(
        NETWORK_OPERATION_TIMEOUT,
        &format!("disconnect {} from {}", container, network),
        client.disconnect(network, container, true),
    )
    .await
}

/// Connect with the standard deadline
pub async fn connect_with_timeout(
    client: &dyn NetworkClient,
    network: &str,
    container: &str,
    endpoint: &EndpointSettings,
) -> Result<()> {
    with_deadline(
        NETWORK_OPERATION_TIMEOUT,
        &format!("connect {} to {}", container, network),
        client.connect(network, container, endpoint),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let result = with_deadline(Duration::from_secs(10), "slow call", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(WatchdogError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_passes_through_result() {
        let ok = with_deadline(Duration::from_secs(10), "fast call", async { Ok(()) }).await;
        assert!(ok.is_ok());

        let err = with_deadline(Duration::from_secs(10), "failing call", async {
            Err(WatchdogError::Network("endpoint gone".to_string()))
        })
        .await;
        assert!(matches!(err, Err(WatchdogError::Network(_))));
    }
}
