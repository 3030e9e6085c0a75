//! Canonical two-person direct-message groups.
//!
//! A DM is an ordinary MLS group whose name is
//! `dm:<min(a,b)>+<max(a,b)>`, so either side computes the same name
//! and `open_dm` is idempotent.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use sigil_crypto::keys::{PublicKey, SecretKey};
use sigil_giftwrap::wrap_rumor;
use sigil_types::group::{dm_name, GroupInfo, GroupStatus, DM_NAME_PREFIX};
use sigil_types::{kind, EventTemplate};

use crate::adapter::GroupEngineAdapter;
use crate::keypackage::KeyPackageManager;
use crate::relay::{RelayClient, PUBLISH_TIMEOUT};
use crate::{MlsError, Result};

/// Opens and lists direct-message groups.
pub struct DmManager {
    adapter: Arc<GroupEngineAdapter>,
    key_packages: Arc<KeyPackageManager>,
    relay: Arc<dyn RelayClient>,
}

impl DmManager {
    pub fn new(
        adapter: Arc<GroupEngineAdapter>,
        key_packages: Arc<KeyPackageManager>,
        relay: Arc<dyn RelayClient>,
    ) -> Self {
        Self {
            adapter,
            key_packages,
            relay,
        }
    }

    /// Open (or bootstrap) the DM group with `peer`.
    ///
    /// Idempotent: while an active group with the canonical name
    /// exists, it is returned without touching the network. Otherwise
    /// the peer's key package is fetched, a group is created, and the
    /// welcome is gift-wrapped to the peer.
    pub async fn open_dm(
        &self,
        my_secret: &SecretKey,
        peer_pubkey_hex: &str,
        relay_urls: &[String],
        now: u64,
        cancel: &CancellationToken,
    ) -> Result<GroupInfo> {
        let my_hex = my_secret.public_key().to_hex();
        let name = dm_name(&my_hex, peer_pubkey_hex);

        if let Some(existing) = self.adapter.active_group_by_name(&name)? {
            return Ok(existing);
        }

        let kp_event = self
            .key_packages
            .discover(peer_pubkey_hex, now, cancel)
            .await?
            .ok_or_else(|| MlsError::KeyPackageNotFound(peer_pubkey_hex.to_string()))?;

        let (group, welcomes, evolution) = self
            .adapter
            .create_group(
                &my_hex,
                &[kp_event.content.clone()],
                &name,
                "",
                &[my_hex.clone()],
                relay_urls,
            )
            .await?;

        self.relay
            .publish(&evolution, PUBLISH_TIMEOUT, cancel)
            .await
            .map_err(|e| MlsError::Relay(e.to_string()))?;

        let peer = PublicKey::parse(peer_pubkey_hex)?;
        for welcome_json in &welcomes {
            self.send_welcome(my_secret, &peer, welcome_json, now, cancel)
                .await?;
        }

        tracing::info!(group_id = %group.mls_group_id, "dm group bootstrapped");
        Ok(group)
    }

    /// All active DM groups.
    pub fn list_dms(&self) -> Result<Vec<GroupInfo>> {
        Ok(self
            .adapter
            .list_groups(Some(GroupStatus::Active))?
            .into_iter()
            .filter(|g| g.name.starts_with(DM_NAME_PREFIX))
            .collect())
    }

    /// Gift-wrap a kind-444 welcome rumor and publish it to the peer.
    async fn send_welcome(
        &self,
        my_secret: &SecretKey,
        peer: &PublicKey,
        welcome_json: &str,
        now: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let rumor = EventTemplate {
            pubkey: String::new(),
            created_at: now,
            kind: kind::WELCOME,
            tags: Vec::new(),
            content: welcome_json.to_string(),
        };
        let wrap = wrap_rumor(&rumor, peer, my_secret, now)?;
        self.relay
            .publish(&wrap.to_json(), PUBLISH_TIMEOUT, cancel)
            .await
            .map_err(|e| MlsError::Relay(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MlsEngine;
    use crate::store::GroupStore;
    use crate::testing::{MemoryEngine, MockRelay};
    use sigil_crypto::keys::Keypair;

    const NOW: u64 = 1_750_000_000;

    struct Fixture {
        dm: DmManager,
        relay: Arc<MockRelay>,
        me: Keypair,
        peer: Keypair,
    }

    async fn fixture() -> Fixture {
        let engine = Arc::new(MemoryEngine::new());
        let relay = Arc::new(MockRelay::new());
        let adapter = Arc::new(GroupEngineAdapter::new(
            engine.clone(),
            GroupStore::open_memory().expect("store"),
        ));
        let key_packages = Arc::new(KeyPackageManager::new(engine, relay.clone()));
        let dm = DmManager::new(adapter, key_packages.clone(), relay.clone());

        let me = Keypair::generate();
        let peer = Keypair::generate();

        // The peer has a key package on the relay.
        let cancel = CancellationToken::new();
        key_packages
            .rotate(&peer.secret, &[], NOW, &cancel)
            .await
            .expect("peer kp");

        Fixture { dm, relay, me, peer }
    }

    #[tokio::test]
    async fn test_open_dm_bootstraps_group() {
        let f = fixture().await;
        let cancel = CancellationToken::new();

        let group = f
            .dm
            .open_dm(&f.me.secret, &f.peer.public.to_hex(), &[], NOW, &cancel)
            .await
            .expect("open");

        assert!(group.name.starts_with("dm:"));
        assert_eq!(
            group.name,
            dm_name(&f.me.public.to_hex(), &f.peer.public.to_hex())
        );

        // One gift-wrapped welcome went out, addressed to the peer.
        let wraps = f.relay.published_of_kind(kind::GIFT_WRAP);
        assert_eq!(wraps.len(), 1);
        assert_eq!(
            wraps[0].tag_value("p"),
            Some(f.peer.public.to_hex().as_str())
        );
    }

    #[tokio::test]
    async fn test_open_dm_idempotent() {
        let f = fixture().await;
        let cancel = CancellationToken::new();

        let first = f
            .dm
            .open_dm(&f.me.secret, &f.peer.public.to_hex(), &[], NOW, &cancel)
            .await
            .expect("open");
        let fetches_after_first = f.relay.fetch_count();

        let second = f
            .dm
            .open_dm(&f.me.secret, &f.peer.public.to_hex(), &[], NOW + 5, &cancel)
            .await
            .expect("open again");

        assert_eq!(first.mls_group_id, second.mls_group_id);
        // No further key-package fetch and no second group.
        assert_eq!(f.relay.fetch_count(), fetches_after_first);
        assert_eq!(f.relay.published_of_kind(kind::GIFT_WRAP).len(), 1);
    }

    #[tokio::test]
    async fn test_open_dm_without_peer_package_fails() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let stranger = Keypair::generate();

        assert!(matches!(
            f.dm.open_dm(&f.me.secret, &stranger.public.to_hex(), &[], NOW, &cancel)
                .await,
            Err(MlsError::KeyPackageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_peer_can_join_from_welcome() {
        let f = fixture().await;
        let cancel = CancellationToken::new();

        f.dm.open_dm(&f.me.secret, &f.peer.public.to_hex(), &[], NOW, &cancel)
            .await
            .expect("open");

        let wrap = &f.relay.published_of_kind(kind::GIFT_WRAP)[0];
        let opened = sigil_giftwrap::unwrap(wrap, &f.peer.secret).expect("unwrap");
        assert_eq!(opened.rumor.kind, kind::WELCOME);
        assert_eq!(opened.sender_pubkey_hex, f.me.public.to_hex());

        // The peer's own engine accepts the welcome.
        let peer_engine = MemoryEngine::new();
        let joined = peer_engine
            .process_welcome(&"00".repeat(32), &opened.rumor.content)
            .await
            .expect("join");
        assert!(joined.name.starts_with("dm:"));
    }

    #[tokio::test]
    async fn test_list_dms_filters_by_prefix() {
        let f = fixture().await;
        let cancel = CancellationToken::new();

        f.dm.open_dm(&f.me.secret, &f.peer.public.to_hex(), &[], NOW, &cancel)
            .await
            .expect("open");

        let dms = f.dm.list_dms().expect("list");
        assert_eq!(dms.len(), 1);
        assert!(dms[0].name.starts_with("dm:"));
    }
}
