//! Kind-443 key-package lifecycle: ensure, rotate, discover.
//!
//! A key package on the author's relays is what lets peers add them to
//! groups. Packages expire (NIP-40 expiration tag) and rotate on a
//! timer; the relay list for key-package discovery is a kind-10051
//! event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sigil_crypto::event as event_codec;
use sigil_crypto::keys::SecretKey;
use sigil_types::{kind, Event, EventTemplate};

use crate::engine::MlsEngine;
use crate::relay::{RelayClient, PUBLISH_TIMEOUT};
use crate::{MlsError, Result};

/// Default rotation interval: 24 hours.
pub const ROTATION_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Published packages stay valid for 30 days unless rotated away.
const KEY_PACKAGE_LIFETIME_SECS: u64 = 30 * 86400;

/// Manages the local identity's published key packages.
pub struct KeyPackageManager {
    engine: Arc<dyn MlsEngine>,
    relay: Arc<dyn RelayClient>,
    rotation_interval: Duration,
    /// Unix second of the last publish per identity.
    last_published: Mutex<HashMap<String, u64>>,
}

impl KeyPackageManager {
    pub fn new(engine: Arc<dyn MlsEngine>, relay: Arc<dyn RelayClient>) -> Self {
        Self::with_rotation(engine, relay, ROTATION_INTERVAL)
    }

    pub fn with_rotation(
        engine: Arc<dyn MlsEngine>,
        relay: Arc<dyn RelayClient>,
        rotation_interval: Duration,
    ) -> Self {
        Self {
            engine,
            relay,
            rotation_interval,
            last_published: Mutex::new(HashMap::new()),
        }
    }

    /// Make sure an unexpired key package for this identity exists on
    /// the relays, publishing one if needed. Returns whether a publish
    /// happened.
    pub async fn ensure_key_package(
        &self,
        secret: &SecretKey,
        relay_hints: &[String],
        now: u64,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let pubkey_hex = secret.public_key().to_hex();

        if let Some(last) = self.last_publish(&pubkey_hex) {
            if now.saturating_sub(last) < self.rotation_interval.as_secs() {
                return Ok(false);
            }
        }

        let filter = format!("{{\"kinds\":[443],\"authors\":[\"{pubkey_hex}\"],\"limit\":1}}");
        let existing = self
            .relay
            .fetch(&filter, PUBLISH_TIMEOUT, cancel)
            .await
            .map_err(|e| MlsError::Relay(e.to_string()))?;

        let live = existing
            .iter()
            .filter_map(|json| Event::from_json(json).ok())
            .any(|event| !is_expired(&event, now));
        if live {
            self.record_publish(&pubkey_hex, now);
            return Ok(false);
        }

        self.publish_key_package(secret, relay_hints, now, cancel)
            .await?;
        Ok(true)
    }

    /// Publish a fresh key package unconditionally.
    pub async fn rotate(
        &self,
        secret: &SecretKey,
        relay_hints: &[String],
        now: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.publish_key_package(secret, relay_hints, now, cancel)
            .await
    }

    /// Publish the kind-10051 key-package relay list.
    pub async fn publish_relay_list(
        &self,
        secret: &SecretKey,
        urls: &[String],
        now: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let tags = urls
            .iter()
            .map(|url| vec!["relay".to_string(), url.clone()])
            .collect();
        let event = event_codec::finalize(
            &EventTemplate {
                pubkey: String::new(),
                created_at: now,
                kind: kind::KEY_PACKAGE_RELAYS,
                tags,
                content: String::new(),
            },
            secret,
        )?;
        self.relay
            .publish(&event.to_json(), PUBLISH_TIMEOUT, cancel)
            .await
            .map_err(|e| MlsError::Relay(e.to_string()))?;
        tracing::info!(relays = urls.len(), "key-package relay list published");
        Ok(())
    }

    /// Fetch a peer's latest live key-package event.
    pub async fn discover(
        &self,
        peer_pubkey_hex: &str,
        now: u64,
        cancel: &CancellationToken,
    ) -> Result<Option<Event>> {
        let filter = format!("{{\"kinds\":[443],\"authors\":[\"{peer_pubkey_hex}\"]}}");
        let found = self
            .relay
            .fetch(&filter, PUBLISH_TIMEOUT, cancel)
            .await
            .map_err(|e| MlsError::Relay(e.to_string()))?;

        Ok(found
            .iter()
            .filter_map(|json| Event::from_json(json).ok())
            .filter(|event| !is_expired(event, now))
            .max_by_key(|event| event.created_at))
    }

    async fn publish_key_package(
        &self,
        secret: &SecretKey,
        relay_hints: &[String],
        now: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pubkey_hex = secret.public_key().to_hex();
        let key_package_json = self.engine.create_key_package(&pubkey_hex).await?;

        let mut tags = vec![vec![
            "expiration".to_string(),
            (now + KEY_PACKAGE_LIFETIME_SECS).to_string(),
        ]];
        if !relay_hints.is_empty() {
            let mut relay_tag = vec!["relays".to_string()];
            relay_tag.extend(relay_hints.iter().cloned());
            tags.push(relay_tag);
        }

        let event = event_codec::finalize(
            &EventTemplate {
                pubkey: String::new(),
                created_at: now,
                kind: kind::KEY_PACKAGE,
                tags,
                content: key_package_json,
            },
            secret,
        )?;
        self.relay
            .publish(&event.to_json(), PUBLISH_TIMEOUT, cancel)
            .await
            .map_err(|e| MlsError::Relay(e.to_string()))?;

        self.record_publish(&pubkey_hex, now);
        tracing::info!(author = %&pubkey_hex[..8], "key package published");
        Ok(())
    }

    fn last_publish(&self, pubkey_hex: &str) -> Option<u64> {
        match self.last_published.lock() {
            Ok(map) => map.get(pubkey_hex).copied(),
            Err(poisoned) => poisoned.into_inner().get(pubkey_hex).copied(),
        }
    }

    fn record_publish(&self, pubkey_hex: &str, now: u64) {
        let mut map = match self.last_published.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.insert(pubkey_hex.to_string(), now);
    }
}

fn is_expired(event: &Event, now: u64) -> bool {
    event
        .tag_value("expiration")
        .and_then(|v| v.parse::<u64>().ok())
        .is_some_and(|expiry| now >= expiry)
}
