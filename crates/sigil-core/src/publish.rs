//! Relay publish with retry.
//!
//! Network failures are retried up to three times with exponential
//! backoff; every other error propagates immediately. Cancellation is
//! honored between attempts.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sigil_mls::relay::{RelayClient, RelayError};

use crate::{CoreError, Result};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Publish an event, retrying transient failures.
pub async fn publish_with_retry(
    relay: &Arc<dyn RelayClient>,
    event_json: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut last_error = None;
    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            let backoff = BACKOFF_BASE * 4u32.pow(attempt - 1);
            tokio::select! {
                () = cancel.cancelled() => return Err(CoreError::Cancelled),
                () = tokio::time::sleep(backoff) => {}
            }
        }

        match relay.publish(event_json, timeout, cancel).await {
            Ok(()) => return Ok(()),
            Err(RelayError::Cancelled) => return Err(CoreError::Cancelled),
            Err(e @ (RelayError::Network(_) | RelayError::Timeout)) => {
                tracing::warn!(attempt, error = %e, "publish failed, will retry");
                last_error = Some(e);
            }
        }
    }
    Err(CoreError::Network(
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "publish failed".to_string()),
    ))
}
