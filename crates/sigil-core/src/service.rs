//! The owned service root.
//!
//! [`Core`] owns every engine; components hold `Arc` handles, never
//! references into each other, so there are no cycles to manage. The
//! external collaborators (vault, MLS library, relay transport) are
//! injected as trait objects.

use std::sync::Arc;

use sigil_media::{BlobClient, MediaEngine};
use sigil_mls::store::GroupStore;
use sigil_mls::{DmManager, GroupEngineAdapter, KeyPackageManager, MlsEngine, RelayClient};
use sigil_policy::{ApprovalPolicy, DelegationEngine};
use sigil_vault::{SecretStore, SessionManager, VaultBackend};

use sigil_crypto::keys::SecretKey;

use crate::config::CoreConfig;
use crate::events::{CoreEvent, EventBus};
use crate::router::EventRouter;
use crate::signing::SigningPipeline;
use crate::Result;

/// The assembled core: signer and messaging engines behind one root.
pub struct Core {
    config: CoreConfig,
    bus: EventBus,
    store: Arc<SecretStore>,
    session: Arc<SessionManager>,
    approvals: Arc<ApprovalPolicy>,
    delegations: Arc<DelegationEngine>,
    groups: Arc<GroupEngineAdapter>,
    key_packages: Arc<KeyPackageManager>,
    dm: Arc<DmManager>,
    media: Option<Arc<MediaEngine>>,
    pipeline: Arc<SigningPipeline>,
    router: Arc<EventRouter>,
    relay: Arc<dyn RelayClient>,
}

impl Core {
    /// Wire up the core from its configuration and collaborators.
    ///
    /// An empty `data_dir` keeps the group store in memory (tests,
    /// ephemeral sessions).
    pub fn new(
        config: CoreConfig,
        vault: Arc<dyn VaultBackend>,
        engine: Arc<dyn MlsEngine>,
        relay: Arc<dyn RelayClient>,
    ) -> Result<Self> {
        let bus = EventBus::default();
        let data_dir = config.data_dir();

        let store = Arc::new(SecretStore::new(vault));
        let session = Arc::new(SessionManager::new(
            config.session.timeout_secs,
            if config.storage.data_dir.is_empty() {
                None
            } else {
                Some(data_dir.join("session"))
            },
        ));
        let approvals = Arc::new(if config.storage.data_dir.is_empty() {
            ApprovalPolicy::in_memory()
        } else {
            ApprovalPolicy::new(&data_dir)
        });
        let delegations = Arc::new(DelegationEngine::new(&data_dir));

        let group_store = if config.storage.data_dir.is_empty() {
            GroupStore::open_memory()?
        } else {
            GroupStore::open(&data_dir.join("groups.db"))?
        };
        let groups = Arc::new(GroupEngineAdapter::new(engine.clone(), group_store));

        let key_packages = Arc::new(KeyPackageManager::with_rotation(
            engine,
            relay.clone(),
            std::time::Duration::from_secs(u64::from(config.mls.rotation_hours) * 3600),
        ));
        let dm = Arc::new(DmManager::new(
            groups.clone(),
            key_packages.clone(),
            relay.clone(),
        ));

        let media = if config.media.blob_server.is_empty() {
            None
        } else {
            Some(Arc::new(MediaEngine::new(
                groups.clone(),
                BlobClient::new(config.media.blob_server.clone()),
            )))
        };

        let pipeline = Arc::new(SigningPipeline::new(
            store.clone(),
            session.clone(),
            approvals.clone(),
            delegations.clone(),
            bus.clone(),
        ));
        let router = Arc::new(EventRouter::new(
            groups.clone(),
            store.clone(),
            bus.clone(),
        ));

        Ok(Self {
            config,
            bus,
            store,
            session,
            approvals,
            delegations,
            groups,
            key_packages,
            dm,
            media,
            pipeline,
            router,
            relay,
        })
    }

    /// Unlock the session and announce it on the bus. Argon2id is
    /// deliberately slow; call from a blocking context.
    pub fn unlock(&self, passphrase: &str) -> Result<()> {
        self.session.authenticate(passphrase)?;
        self.bus.emit(CoreEvent::SessionUnlocked);
        Ok(())
    }

    /// Lock the session and announce it on the bus.
    pub fn lock(&self) {
        self.session.lock();
        self.bus.emit(CoreEvent::SessionLocked);
    }

    /// Create a group and announce it on the bus.
    pub async fn create_group(
        &self,
        creator_pubkey_hex: &str,
        member_key_packages: &[String],
        name: &str,
        description: &str,
        admin_pubkeys: &[String],
        relay_urls: &[String],
    ) -> Result<(sigil_types::group::GroupInfo, Vec<String>, String)> {
        let (group, welcomes, evolution) = self
            .groups
            .create_group(
                creator_pubkey_hex,
                member_key_packages,
                name,
                description,
                admin_pubkeys,
                relay_urls,
            )
            .await?;
        self.bus.emit(CoreEvent::GroupCreated {
            group_id_hex: group.mls_group_id.clone(),
        });
        Ok((group, welcomes, evolution))
    }

    /// Make sure this identity has a live key package on the relays,
    /// announcing any publish on the bus.
    pub async fn ensure_key_package(
        &self,
        secret: &SecretKey,
        relay_hints: &[String],
        now: u64,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<bool> {
        let published = self
            .key_packages
            .ensure_key_package(secret, relay_hints, now, cancel)
            .await?;
        if published {
            self.bus.emit(CoreEvent::KeyPackagePublished {
                pubkey_hex: secret.public_key().to_hex(),
            });
        }
        Ok(published)
    }

    /// Encrypt an inner event for a group and publish the kind-445
    /// envelope with retry. Returns the envelope JSON.
    pub async fn send_group_message(
        &self,
        group_id: &str,
        inner_event_json: &str,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<String> {
        let wire = self.groups.send_message(group_id, inner_event_json).await?;
        let timeout =
            std::time::Duration::from_secs(u64::from(self.config.relays.publish_timeout_secs));
        crate::publish::publish_with_retry(&self.relay, &wire, timeout, cancel).await?;
        Ok(wire)
    }

    /// Import an identity and announce it on the bus.
    pub async fn add_identity(&self, npub: &str, secret: &SecretKey, label: &str) -> Result<()> {
        self.store.add(npub, secret, label).await?;
        self.bus.emit(CoreEvent::IdentityAdded {
            npub: npub.to_string(),
        });
        Ok(())
    }

    /// Delete an identity and announce it on the bus.
    pub async fn remove_identity(&self, selector: &str) -> Result<()> {
        self.store.remove(selector).await?;
        self.bus.emit(CoreEvent::IdentityRemoved {
            npub: selector.to_string(),
        });
        Ok(())
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn identities(&self) -> &Arc<SecretStore> {
        &self.store
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn approvals(&self) -> &Arc<ApprovalPolicy> {
        &self.approvals
    }

    pub fn delegations(&self) -> &Arc<DelegationEngine> {
        &self.delegations
    }

    pub fn groups(&self) -> &Arc<GroupEngineAdapter> {
        &self.groups
    }

    pub fn key_packages(&self) -> &Arc<KeyPackageManager> {
        &self.key_packages
    }

    pub fn dm(&self) -> &Arc<DmManager> {
        &self.dm
    }

    /// Media pipeline; `None` when no blob server is configured.
    pub fn media(&self) -> Option<&Arc<MediaEngine>> {
        self.media.as_ref()
    }

    pub fn signing(&self) -> &Arc<SigningPipeline> {
        &self.pipeline
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn relay(&self) -> &Arc<dyn RelayClient> {
        &self.relay
    }
}
