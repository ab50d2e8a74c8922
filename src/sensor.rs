//! Export signal sensor.
//!
//! Load tasks wait for the exporter to land the day's file before the bulk
//! load is attempted. The sensor polls object storage at a fixed interval up
//! to an overall timeout; exceeding the timeout is a task failure and the
//! load job is never submitted.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{CancelledSnafu, PollSnafu, SensorError, TimeoutSnafu};
use crate::storage::StorageClient;
use snafu::prelude::*;

/// Wait until `object` exists in storage, polling every `poke_interval`.
///
/// Returns as soon as the object is observed. Fails with
/// [`SensorError::Timeout`] once `timeout` has elapsed without it appearing,
/// and with [`SensorError::Cancelled`] if shutdown is requested mid-wait.
pub async fn wait_for_object(
    storage: &StorageClient,
    object: &str,
    poke_interval: Duration,
    timeout: Duration,
    shutdown: &CancellationToken,
) -> Result<(), SensorError> {
    let started = Instant::now();
    let deadline = started + timeout;

    info!(
        object,
        timeout_secs = timeout.as_secs(),
        poke_interval_secs = poke_interval.as_secs(),
        "Waiting for export signal"
    );

    loop {
        if storage.exists(object).await.context(PollSnafu { object })? {
            info!(
                object,
                waited_secs = started.elapsed().as_secs(),
                "Export signal observed"
            );
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return TimeoutSnafu {
                object,
                waited_secs: started.elapsed().as_secs(),
            }
            .fail();
        }

        debug!(object, "Export signal not present yet");
        let sleep = poke_interval.min(deadline - now);
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                return CancelledSnafu { object }.fail();
            }

            _ = tokio::time::sleep(sleep) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const OBJECT: &str = "export/blocks/block_date=2024-01-01/blocks.json";

    fn client(dir: &TempDir) -> StorageClient {
        StorageClient::for_url(dir.path().to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_wait_returns_when_object_present() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("export/blocks/block_date=2024-01-01");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("blocks.json"), b"{}").unwrap();

        let storage = client(&temp_dir);
        wait_for_object(
            &storage,
            OBJECT,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_when_object_never_appears() {
        let temp_dir = TempDir::new().unwrap();
        let storage = client(&temp_dir);

        let err = wait_for_object(
            &storage,
            OBJECT,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match err {
            SensorError::Timeout {
                object,
                waited_secs,
            } => {
                assert_eq!(object, OBJECT);
                assert!(waited_secs >= 3600);
            }
            other => panic!("Expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_observes_late_arrival() {
        let temp_dir = TempDir::new().unwrap();
        let storage = client(&temp_dir);
        let nested = temp_dir.path().join("export/blocks/block_date=2024-01-01");

        let shutdown = CancellationToken::new();
        let waiter = wait_for_object(
            &storage,
            OBJECT,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            &shutdown,
        );

        let writer = async {
            tokio::time::sleep(Duration::from_secs(90)).await;
            std::fs::create_dir_all(&nested).unwrap();
            std::fs::write(nested.join("blocks.json"), b"{}").unwrap();
        };

        let (result, ()) = tokio::join!(waiter, writer);
        result.unwrap();
    }

    #[tokio::test]
    async fn test_wait_cancelled_by_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let storage = client(&temp_dir);

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let err = wait_for_object(
            &storage,
            OBJECT,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            &shutdown,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SensorError::Cancelled { .. }));
    }
}
