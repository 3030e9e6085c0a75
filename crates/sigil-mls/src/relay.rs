//! The relay collaborator seam.
//!
//! The wire codec for talking to Nostr relays lives outside the core;
//! it surfaces here as publish/fetch/subscribe over event JSON.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default publish timeout.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Error types for relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Transient I/O failure; retryable.
    #[error("network error: {0}")]
    Network(String),

    /// The operation did not complete within its timeout.
    #[error("relay operation timed out")]
    Timeout,

    /// The caller cancelled the operation.
    #[error("cancelled")]
    Cancelled,
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Transport to the relay pool.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Publish an event, waiting up to `timeout` for acceptance.
    async fn publish(
        &self,
        event_json: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> RelayResult<()>;

    /// One-shot query: fetch stored events matching a filter.
    async fn fetch(
        &self,
        filter_json: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> RelayResult<Vec<String>>;

    /// Long-lived subscription; events arrive as JSON on the channel.
    fn subscribe(&self, filter_json: &str) -> mpsc::Receiver<String>;
}
