//! Deterministic in-process doubles: a symmetric-envelope MLS engine
//! and a scriptable relay. Used by unit and integration tests across
//! the workspace; never by production code.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sigil_crypto::event as event_codec;
use sigil_crypto::keys::Keypair;
use sigil_types::imeta::Imeta;
use sigil_types::{kind, Event, EventTemplate};

use crate::engine::{EngineGroup, EngineMessage, MediaCiphertext, MlsEngine};
use crate::relay::{RelayClient, RelayError, RelayResult};
use crate::{MlsError, Result};

#[derive(Clone, Serialize, Deserialize)]
struct GroupState {
    group_id: String,
    epoch: u64,
    name: String,
    description: String,
    admin_pubkeys: Vec<String>,
    relay_urls: Vec<String>,
    member_pubkeys: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct WelcomeJson {
    group: GroupState,
    member_pubkey: String,
}

#[derive(Serialize, Deserialize)]
struct KeyPackageJson {
    owner_pubkey: String,
    init_key: String,
}

/// An MLS engine double. Epoch handling, envelope framing, and the
/// welcome flow behave like the real library; the cryptography is a
/// keyed XOR, which is exactly as strong as a test needs.
#[derive(Default)]
pub struct MemoryEngine {
    groups: Mutex<HashMap<String, GroupState>>,
    /// Envelope ids of application messages this engine sent.
    own_envelope_ids: Mutex<HashSet<String>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn envelope(&self, group_id: &str, content: String) -> Result<String> {
        // Per-message ephemeral signer, like MIP-03 prescribes.
        let ephemeral = Keypair::generate();
        let event = event_codec::finalize(
            &EventTemplate {
                pubkey: String::new(),
                created_at: 1,
                kind: kind::GROUP_MESSAGE,
                tags: vec![vec!["h".to_string(), group_id.to_string()]],
                content,
            },
            &ephemeral.secret,
        )
        .map_err(|e| MlsError::Engine(e.to_string()))?;
        Ok(event.to_json())
    }

    fn with_group<T>(
        &self,
        group_id: &str,
        f: impl FnOnce(&mut GroupState) -> T,
    ) -> Result<T> {
        let mut groups = lock(&self.groups);
        let state = groups
            .get_mut(group_id)
            .ok_or_else(|| MlsError::GroupNotFound(group_id.to_string()))?;
        Ok(f(state))
    }
}

fn media_key(group_id: &str, epoch: u64, nonce: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(group_id.as_bytes());
    hasher.update(epoch.to_le_bytes());
    hasher.update(nonce);
    hasher.finalize().into()
}

fn xor_keystream(data: &[u8], key: &[u8; 32]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, b)| b ^ key[i % key.len()])
        .collect()
}

#[async_trait]
impl MlsEngine for MemoryEngine {
    async fn create_key_package(&self, owner_pubkey_hex: &str) -> Result<String> {
        let mut init_key = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut init_key);
        serde_json::to_string(&KeyPackageJson {
            owner_pubkey: owner_pubkey_hex.to_string(),
            init_key: hex::encode(init_key),
        })
        .map_err(|e| MlsError::Engine(e.to_string()))
    }

    async fn create_group(
        &self,
        creator_pubkey_hex: &str,
        member_key_packages: &[String],
        name: &str,
        description: &str,
        admin_pubkeys: &[String],
        relay_urls: &[String],
    ) -> Result<(EngineGroup, Vec<String>, String)> {
        let mut id_bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut id_bytes);
        let group_id = hex::encode(id_bytes);

        let mut member_pubkeys = vec![creator_pubkey_hex.to_string()];
        let mut welcomes = Vec::new();
        for kp_json in member_key_packages {
            let kp: KeyPackageJson = serde_json::from_str(kp_json)
                .map_err(|e| MlsError::Engine(format!("bad key package: {e}")))?;
            member_pubkeys.push(kp.owner_pubkey.clone());
        }

        let state = GroupState {
            group_id: group_id.clone(),
            epoch: 0,
            name: name.to_string(),
            description: description.to_string(),
            admin_pubkeys: admin_pubkeys.to_vec(),
            relay_urls: relay_urls.to_vec(),
            member_pubkeys: member_pubkeys.clone(),
        };

        for member in member_pubkeys.iter().skip(1) {
            let welcome = WelcomeJson {
                group: state.clone(),
                member_pubkey: member.clone(),
            };
            welcomes.push(
                serde_json::to_string(&welcome).map_err(|e| MlsError::Engine(e.to_string()))?,
            );
        }

        let evolution = self.envelope(&group_id, "commit:0".to_string())?;
        lock(&self.groups).insert(group_id.clone(), state.clone());

        Ok((to_handle(&state), welcomes, evolution))
    }

    async fn process_welcome(&self, _wrapper_id: &str, welcome_json: &str) -> Result<EngineGroup> {
        let welcome: WelcomeJson = serde_json::from_str(welcome_json)
            .map_err(|e| MlsError::Protocol(format!("bad welcome: {e}")))?;
        let state = welcome.group;
        lock(&self.groups).insert(state.group_id.clone(), state.clone());
        Ok(to_handle(&state))
    }

    async fn send_message(&self, group_id: &str, inner_event_json: &str) -> Result<String> {
        self.with_group(group_id, |_| ())?;
        let envelope_json = self.envelope(group_id, inner_event_json.to_string())?;
        let envelope =
            Event::from_json(&envelope_json).map_err(|e| MlsError::Engine(e.to_string()))?;
        lock(&self.own_envelope_ids).insert(envelope.id);
        Ok(envelope_json)
    }

    async fn process_message(&self, event_json: &str) -> Result<EngineMessage> {
        let event =
            Event::from_json(event_json).map_err(|e| MlsError::Protocol(e.to_string()))?;
        if event.kind != kind::GROUP_MESSAGE {
            return Err(MlsError::Protocol(format!("kind {} is not 445", event.kind)));
        }
        let group_id = event
            .tag_value("h")
            .ok_or_else(|| MlsError::Protocol("missing group tag".to_string()))?
            .to_string();

        if let Some(epoch_str) = event.content.strip_prefix("commit:") {
            let epoch: u64 = epoch_str
                .parse()
                .map_err(|_| MlsError::Protocol("bad commit epoch".to_string()))?;
            self.with_group(&group_id, |state| {
                state.epoch = state.epoch.max(epoch);
            })?;
            return Ok(EngineMessage::Commit { group_id, epoch });
        }

        if lock(&self.own_envelope_ids).contains(&event.id) {
            return Ok(EngineMessage::OwnMessage);
        }

        self.with_group(&group_id, |_| ())?;
        Ok(EngineMessage::Application {
            group_id,
            inner_event_json: event.content,
        })
    }

    async fn add_member(
        &self,
        group_id: &str,
        key_package_json: &str,
    ) -> Result<(String, String)> {
        let kp: KeyPackageJson = serde_json::from_str(key_package_json)
            .map_err(|e| MlsError::Engine(format!("bad key package: {e}")))?;

        let (new_epoch, state) = self.with_group(group_id, |state| {
            state.epoch += 1;
            state.member_pubkeys.push(kp.owner_pubkey.clone());
            (state.epoch, state.clone())
        })?;

        let welcome = serde_json::to_string(&WelcomeJson {
            group: state,
            member_pubkey: kp.owner_pubkey,
        })
        .map_err(|e| MlsError::Engine(e.to_string()))?;
        let commit = self.envelope(group_id, format!("commit:{new_epoch}"))?;
        Ok((welcome, commit))
    }

    async fn remove_member(&self, group_id: &str, member_pubkey_hex: &str) -> Result<String> {
        let new_epoch = self.with_group(group_id, |state| {
            let before = state.member_pubkeys.len();
            state.member_pubkeys.retain(|m| m != member_pubkey_hex);
            if state.member_pubkeys.len() == before {
                return Err(MlsError::Engine(format!(
                    "not a member: {member_pubkey_hex}"
                )));
            }
            state.epoch += 1;
            Ok(state.epoch)
        })??;
        self.envelope(group_id, format!("commit:{new_epoch}"))
    }

    async fn encrypt_media(
        &self,
        group_id: &str,
        plaintext: &[u8],
        _content_type: &str,
        _filename: &str,
    ) -> Result<MediaCiphertext> {
        let epoch = self.with_group(group_id, |state| state.epoch)?;
        let mut nonce = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce);

        let key = media_key(group_id, epoch, &nonce);
        let ciphertext = xor_keystream(plaintext, &key);
        let file_hash: [u8; 32] = Sha256::digest(&ciphertext).into();

        Ok(MediaCiphertext {
            ciphertext,
            nonce,
            file_hash,
            epoch,
        })
    }

    async fn decrypt_media(
        &self,
        group_id: &str,
        ciphertext: &[u8],
        imeta: &Imeta,
    ) -> Result<Vec<u8>> {
        self.with_group(group_id, |_| ())?;
        let nonce_bytes = BASE64
            .decode(&imeta.nonce)
            .map_err(|e| MlsError::Protocol(format!("bad nonce: {e}")))?;
        let nonce: [u8; 32] = nonce_bytes
            .try_into()
            .map_err(|_| MlsError::Protocol("bad nonce length".to_string()))?;
        let key = media_key(group_id, imeta.epoch, &nonce);
        Ok(xor_keystream(ciphertext, &key))
    }
}

fn to_handle(state: &GroupState) -> EngineGroup {
    EngineGroup {
        group_id: state.group_id.clone(),
        epoch: state.epoch,
        name: state.name.clone(),
        description: state.description.clone(),
        admin_pubkeys: state.admin_pubkeys.clone(),
        relay_urls: state.relay_urls.clone(),
    }
}

/// A scriptable relay. Published events are recorded and forwarded to
/// subscribers; fetches answer from seeded events with minimal
/// kind/author filter matching.
#[derive(Default)]
pub struct MockRelay {
    published: Mutex<Vec<String>>,
    seeded: Mutex<Vec<String>>,
    fetch_count: AtomicUsize,
    subscribers: Mutex<Vec<mpsc::Sender<String>>>,
}

#[derive(Deserialize)]
struct Filter {
    #[serde(default)]
    kinds: Vec<u16>,
    #[serde(default)]
    authors: Vec<String>,
}

impl MockRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an event so subsequent fetches can find it.
    pub fn seed(&self, event_json: &str) {
        lock(&self.seeded).push(event_json.to_string());
    }

    /// Everything published so far.
    pub fn published(&self) -> Vec<String> {
        lock(&self.published).clone()
    }

    /// Published events of one kind.
    pub fn published_of_kind(&self, kind: u16) -> Vec<Event> {
        lock(&self.published)
            .iter()
            .filter_map(|json| Event::from_json(json).ok())
            .filter(|e| e.kind == kind)
            .collect()
    }

    /// How many fetches were served.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Push an event to all live subscribers.
    pub async fn inject(&self, event_json: &str) {
        let subscribers = lock(&self.subscribers).clone();
        for tx in subscribers {
            let _ = tx.send(event_json.to_string()).await;
        }
    }
}

#[async_trait]
impl RelayClient for MockRelay {
    async fn publish(
        &self,
        event_json: &str,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> RelayResult<()> {
        if cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }
        lock(&self.published).push(event_json.to_string());
        // Published events become fetchable, like a real relay.
        lock(&self.seeded).push(event_json.to_string());
        Ok(())
    }

    async fn fetch(
        &self,
        filter_json: &str,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> RelayResult<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let filter: Filter = serde_json::from_str(filter_json)
            .map_err(|e| RelayError::Network(e.to_string()))?;

        Ok(lock(&self.seeded)
            .iter()
            .filter(|json| {
                let Ok(event) = Event::from_json(json) else {
                    return false;
                };
                (filter.kinds.is_empty() || filter.kinds.contains(&event.kind))
                    && (filter.authors.is_empty() || filter.authors.contains(&event.pubkey))
            })
            .cloned()
            .collect())
    }

    fn subscribe(&self, _filter_json: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(64);
        lock(&self.subscribers).push(tx);
        rx
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
