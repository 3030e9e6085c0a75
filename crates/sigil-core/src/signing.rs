//! The authorization / signing pipeline.
//!
//! Every signing request walks the same gauntlet: approval policy →
//! session state → secret store → optional delegation → event codec.
//! Requests from one application are serialized; different applications
//! may sign concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex as AsyncMutex;

use sigil_crypto::event as event_codec;
use sigil_crypto::keys::PublicKey;
use sigil_crypto::nip04;
use sigil_crypto::nip44::{self, ConversationKey};
use sigil_policy::{ApprovalPolicy, AskOutcome, DelegationEngine};
use sigil_types::{Event, EventTemplate};
use sigil_vault::{SecretStore, SessionManager};

use crate::events::{CoreEvent, EventBus};
use crate::{CoreError, Result};

/// Outcome of a signing request.
#[derive(Debug)]
pub enum SignOutcome {
    /// Signed and ready to publish.
    Signed(Event),
    /// No remembered decision; an approval prompt was surfaced via the
    /// event bus. Retry after `ApprovalPolicy::remember`.
    NeedsApproval,
    /// The user has denied this application/kind combination.
    Denied,
}

/// The signing front door for external applications.
pub struct SigningPipeline {
    store: Arc<SecretStore>,
    session: Arc<SessionManager>,
    approvals: Arc<ApprovalPolicy>,
    delegations: Arc<DelegationEngine>,
    bus: EventBus,
    /// Per-application serialization.
    app_locks: std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SigningPipeline {
    pub fn new(
        store: Arc<SecretStore>,
        session: Arc<SessionManager>,
        approvals: Arc<ApprovalPolicy>,
        delegations: Arc<DelegationEngine>,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            session,
            approvals,
            delegations,
            bus,
            app_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Sign `template` with the identity selected by `identity`, on
    /// behalf of `application_id`.
    ///
    /// With `delegation_id`, the matching delegation is validated and
    /// its tag appended to the event.
    pub async fn sign_event(
        &self,
        application_id: &str,
        identity: &str,
        template: &EventTemplate,
        delegation_id: Option<&str>,
    ) -> Result<SignOutcome> {
        let lock = self.app_lock(application_id);
        let _guard = lock.lock().await;

        match self.approvals.ask(application_id, template.kind) {
            AskOutcome::Deny => {
                tracing::info!(application_id, kind = template.kind, "signing denied by policy");
                return Ok(SignOutcome::Denied);
            }
            AskOutcome::Unknown => {
                self.bus.emit(CoreEvent::ApprovalRequested {
                    application_id: application_id.to_string(),
                    kind: template.kind,
                });
                return Ok(SignOutcome::NeedsApproval);
            }
            AskOutcome::Allow => {}
        }

        // The timeout check may itself flip the session to locked.
        self.session.check_timeout();
        if !self.session.is_authenticated() {
            return Err(CoreError::Locked);
        }

        let (secret, _entry) = self
            .store
            .lookup(identity)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("identity {identity}")))?;

        let mut template = template.clone();
        if let Some(delegation_id) = delegation_id {
            let delegation = self
                .delegations
                .find(delegation_id)?
                .ok_or_else(|| CoreError::NotFound(format!("delegation {delegation_id}")))?;
            // The delegation must name the signing key as delegatee.
            if delegation.delegatee_pubkey_hex != secret.public_key().to_hex() {
                return Err(CoreError::InvalidInput(
                    "delegation names a different delegatee".to_string(),
                ));
            }
            if delegation.revoked {
                return Err(CoreError::Revoked);
            }
            let now = unix_now();
            if !self.delegations.is_valid(&delegation, 0, now) {
                return Err(CoreError::Expired);
            }
            if !self.delegations.is_valid(&delegation, template.kind, now) {
                return Err(CoreError::InvalidInput(format!(
                    "kind {} not covered by delegation",
                    template.kind
                )));
            }
            template.tags.push(self.delegations.build_tag(&delegation)?);
        }

        let event = event_codec::finalize(&template, &secret)?;
        self.session.extend();
        tracing::info!(
            application_id,
            kind = event.kind,
            id = %sigil_types::encoding::short_id(&event.id),
            "event signed"
        );
        Ok(SignOutcome::Signed(event))
    }

    /// The public key for an identity, as `(hex, npub)`.
    pub async fn public_key(&self, identity: &str) -> Result<(String, String)> {
        let (secret, entry) = self
            .store
            .lookup(identity)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("identity {identity}")))?;
        Ok((secret.public_key().to_hex(), entry.npub))
    }

    /// NIP-44 encrypt `plaintext` for `peer` with the selected identity.
    pub async fn nip44_encrypt(
        &self,
        identity: &str,
        peer_pubkey_hex: &str,
        plaintext: &str,
    ) -> Result<String> {
        let secret = self.unlocked_secret(identity).await?;
        let peer = PublicKey::parse(peer_pubkey_hex)?;
        let key = ConversationKey::derive(&secret, &peer)?;
        let ciphertext = nip44::encrypt(&key, plaintext)?;
        self.session.extend();
        Ok(ciphertext)
    }

    /// NIP-44 decrypt a payload from `peer`.
    pub async fn nip44_decrypt(
        &self,
        identity: &str,
        peer_pubkey_hex: &str,
        ciphertext: &str,
    ) -> Result<String> {
        let secret = self.unlocked_secret(identity).await?;
        let peer = PublicKey::parse(peer_pubkey_hex)?;
        let key = ConversationKey::derive(&secret, &peer)?;
        let plaintext = nip44::decrypt(&key, ciphertext)?;
        self.session.extend();
        Ok(plaintext)
    }

    /// Decrypt a legacy NIP-04 payload from `peer`. Read-only support;
    /// new traffic uses NIP-44.
    pub async fn nip04_decrypt(
        &self,
        identity: &str,
        peer_pubkey_hex: &str,
        ciphertext: &str,
    ) -> Result<String> {
        let secret = self.unlocked_secret(identity).await?;
        let peer = PublicKey::parse(peer_pubkey_hex)?;
        let plaintext = nip04::decrypt(&secret, &peer, ciphertext)?;
        self.session.extend();
        Ok(plaintext)
    }

    /// Fetch an identity's secret, enforcing the session gate.
    async fn unlocked_secret(&self, identity: &str) -> Result<sigil_crypto::keys::SecretKey> {
        self.session.check_timeout();
        if !self.session.is_authenticated() {
            return Err(CoreError::Locked);
        }
        let (secret, _) = self
            .store
            .lookup(identity)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("identity {identity}")))?;
        Ok(secret)
    }

    fn app_lock(&self, application_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.app_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(application_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
