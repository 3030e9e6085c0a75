//! The group engine adapter: ordering, epoch bookkeeping, local view.
//!
//! A pure mapping over the [`MlsEngine`] plus the [`GroupStore`]. All
//! inbound kind-445 processing for one group is serialized so commits
//! apply in arrival order; distinct groups progress independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use sigil_types::group::{GroupInfo, GroupStatus};
use sigil_types::{Event, EventTemplate};

use crate::engine::{EngineGroup, EngineMessage, MediaCiphertext, MlsEngine};
use crate::store::{GroupStore, StoredMessage};
use crate::{MlsError, Result};

/// Adapter-level outcome of processing a kind-445 event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Processed {
    Application {
        group_id: String,
        inner_event_json: String,
    },
    Commit {
        group_id: String,
        epoch: u64,
    },
    OwnMessage,
    Other,
}

/// Thin surface over the MLS library, and sole writer to the group
/// database.
pub struct GroupEngineAdapter {
    engine: Arc<dyn MlsEngine>,
    store: GroupStore,
    /// Per-group processing locks; the entry is created on first use.
    group_locks: std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl GroupEngineAdapter {
    pub fn new(engine: Arc<dyn MlsEngine>, store: GroupStore) -> Self {
        Self {
            engine,
            store,
            group_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Create a group and persist its local view.
    ///
    /// Returns the stored view, one welcome per added member (to be
    /// gift-wrapped as kind 444), and the evolution event JSON (to be
    /// published as kind 445).
    pub async fn create_group(
        &self,
        creator_pubkey_hex: &str,
        member_key_packages: &[String],
        name: &str,
        description: &str,
        admin_pubkeys: &[String],
        relay_urls: &[String],
    ) -> Result<(GroupInfo, Vec<String>, String)> {
        let (handle, welcomes, evolution) = self
            .engine
            .create_group(
                creator_pubkey_hex,
                member_key_packages,
                name,
                description,
                admin_pubkeys,
                relay_urls,
            )
            .await?;

        let group = to_info(&handle, GroupStatus::Active);
        self.store.upsert_group(&group)?;
        tracing::info!(group_id = %group.mls_group_id, name, "group created");
        Ok((group, welcomes, evolution))
    }

    /// Join a group from an unwrapped welcome rumor.
    pub async fn process_welcome(
        &self,
        wrapper_id: &str,
        welcome_json: &str,
    ) -> Result<GroupInfo> {
        let handle = self.engine.process_welcome(wrapper_id, welcome_json).await?;
        let group = to_info(&handle, GroupStatus::Active);
        self.store.upsert_group(&group)?;
        tracing::info!(group_id = %group.mls_group_id, "joined group from welcome");
        Ok(group)
    }

    /// Encrypt and frame an inner event for the group. The sent message
    /// is recorded locally so list models include it immediately.
    pub async fn send_message(
        &self,
        group_id: &str,
        inner_event_json: &str,
    ) -> Result<String> {
        self.require_group(group_id)?;
        let lock = self.lock_for(group_id);
        let _guard = lock.lock().await;

        let wire = self.engine.send_message(group_id, inner_event_json).await?;
        if let Some(message) = stored_message(group_id, inner_event_json) {
            self.store.insert_message(&message)?;
        }
        Ok(wire)
    }

    /// Process an inbound kind-445 event, serialized per group.
    pub async fn process_message(&self, event_json: &str) -> Result<Processed> {
        // The group routing tag is readable without decryption; fall
        // back to a shared lock when it is absent.
        let group_hint = Event::from_json(event_json)
            .ok()
            .and_then(|e| e.tag_value("h").map(str::to_string))
            .unwrap_or_default();
        let lock = self.lock_for(&group_hint);
        let _guard = lock.lock().await;

        match self.engine.process_message(event_json).await? {
            EngineMessage::Application {
                group_id,
                inner_event_json,
            } => {
                self.require_group(&group_id)?;
                if let Some(message) = stored_message(&group_id, &inner_event_json) {
                    self.store.insert_message(&message)?;
                }
                Ok(Processed::Application {
                    group_id,
                    inner_event_json,
                })
            }
            EngineMessage::Commit { group_id, epoch } => {
                self.store.set_epoch(&group_id, epoch)?;
                tracing::debug!(group_id = %group_id, epoch, "commit applied");
                Ok(Processed::Commit { group_id, epoch })
            }
            EngineMessage::OwnMessage => Ok(Processed::OwnMessage),
            EngineMessage::Other => Ok(Processed::Other),
        }
    }

    /// Produce an Add proposal + commit for a new member.
    pub async fn add_member(
        &self,
        group_id: &str,
        key_package_json: &str,
    ) -> Result<(String, String)> {
        self.require_group(group_id)?;
        let lock = self.lock_for(group_id);
        let _guard = lock.lock().await;
        self.engine.add_member(group_id, key_package_json).await
    }

    /// Produce a Remove commit for an existing member. The epoch
    /// advances when the published commit is processed back.
    pub async fn remove_member(
        &self,
        group_id: &str,
        member_pubkey_hex: &str,
    ) -> Result<String> {
        self.require_group(group_id)?;
        let lock = self.lock_for(group_id);
        let _guard = lock.lock().await;
        self.engine.remove_member(group_id, member_pubkey_hex).await
    }

    /// Encrypt media under the group's current epoch secret.
    pub async fn encrypt_media(
        &self,
        group_id: &str,
        plaintext: &[u8],
        content_type: &str,
        filename: &str,
    ) -> Result<MediaCiphertext> {
        self.require_group(group_id)?;
        self.engine
            .encrypt_media(group_id, plaintext, content_type, filename)
            .await
    }

    /// Decrypt downloaded media.
    pub async fn decrypt_media(
        &self,
        group_id: &str,
        ciphertext: &[u8],
        imeta: &sigil_types::imeta::Imeta,
    ) -> Result<Vec<u8>> {
        self.require_group(group_id)?;
        self.engine.decrypt_media(group_id, ciphertext, imeta).await
    }

    /// The stored view of a group.
    pub fn group(&self, group_id: &str) -> Result<Option<GroupInfo>> {
        self.store.group_by_id(group_id)
    }

    /// The most recent active group with this name.
    pub fn active_group_by_name(&self, name: &str) -> Result<Option<GroupInfo>> {
        self.store.active_group_by_name(name)
    }

    /// All stored groups, optionally by status.
    pub fn list_groups(&self, status: Option<GroupStatus>) -> Result<Vec<GroupInfo>> {
        self.store.list_groups(status)
    }

    /// Stored messages for a group, in arrival order.
    pub fn messages(&self, group_id: &str) -> Result<Vec<StoredMessage>> {
        self.store.messages(group_id)
    }

    /// Mark a group left/removed.
    pub fn set_status(&self, group_id: &str, status: GroupStatus) -> Result<()> {
        self.store.set_status(group_id, status)
    }

    fn require_group(&self, group_id: &str) -> Result<()> {
        if self.store.group_by_id(group_id)?.is_none() {
            return Err(MlsError::GroupNotFound(group_id.to_string()));
        }
        Ok(())
    }

    fn lock_for(&self, group_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.group_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(group_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

fn to_info(handle: &EngineGroup, status: GroupStatus) -> GroupInfo {
    GroupInfo {
        mls_group_id: handle.group_id.clone(),
        name: handle.name.clone(),
        description: handle.description.clone(),
        epoch: handle.epoch,
        status,
        admin_pubkeys: handle.admin_pubkeys.clone(),
        relay_urls: handle.relay_urls.clone(),
    }
}

/// Project an inner event into a stored message row. Events without an
/// id (rumors mid-composition) are skipped.
fn stored_message(group_id: &str, inner_event_json: &str) -> Option<StoredMessage> {
    if let Ok(event) = Event::from_json(inner_event_json) {
        return Some(StoredMessage {
            event_id: event.id.clone(),
            group_id: group_id.to_string(),
            author_pubkey: event.pubkey.clone(),
            created_at: event.created_at,
            event_json: inner_event_json.to_string(),
        });
    }
    // Inner group events are rumors: unsigned, but carrying an id.
    #[derive(serde::Deserialize)]
    struct RumorShape {
        id: String,
        #[serde(flatten)]
        template: EventTemplate,
    }
    let rumor: RumorShape = serde_json::from_str(inner_event_json).ok()?;
    Some(StoredMessage {
        event_id: rumor.id,
        group_id: group_id.to_string(),
        author_pubkey: rumor.template.pubkey,
        created_at: rumor.template.created_at,
        event_json: inner_event_json.to_string(),
    })
}
