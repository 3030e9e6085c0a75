//! The external MLS library surface.
//!
//! The engine owns the MLS tree state and cryptography; callers see
//! only opaque JSON payloads and the data below. Group metadata (name,
//! admins, relays) rides in the group context extensions, so the engine
//! returns it alongside the handle.

use async_trait::async_trait;

use sigil_types::imeta::Imeta;

use crate::Result;

/// Handle to a group held by the engine, with the metadata carried in
/// its context extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineGroup {
    /// Opaque MLS group id, lowercase hex.
    pub group_id: String,
    /// Current epoch.
    pub epoch: u64,
    pub name: String,
    pub description: String,
    /// Admin x-only public keys, lowercase hex.
    pub admin_pubkeys: Vec<String>,
    /// Relays this group publishes to.
    pub relay_urls: Vec<String>,
}

/// Outcome of processing an inbound kind-445 event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineMessage {
    /// An application message decrypted to the inner event.
    Application {
        group_id: String,
        inner_event_json: String,
    },
    /// A commit advanced the group to `epoch`.
    Commit { group_id: String, epoch: u64 },
    /// Our own message echoed back by a relay.
    OwnMessage,
    /// Valid MLS, nothing actionable (e.g. a proposal awaiting commit).
    Other,
}

/// Output of media encryption under the group's epoch secret.
#[derive(Clone, Debug)]
pub struct MediaCiphertext {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; 32],
    /// SHA-256 of the ciphertext.
    pub file_hash: [u8; 32],
    /// The epoch whose secret the key was derived from.
    pub epoch: u64,
}

/// The MLS algebra collaborator (RFC 9420 behind the scenes).
#[async_trait]
pub trait MlsEngine: Send + Sync {
    /// Produce a fresh key package for `owner_pubkey_hex`, serialized
    /// for embedding in a kind-443 event.
    async fn create_key_package(&self, owner_pubkey_hex: &str) -> Result<String>;

    /// Create a group with the creator plus one member per key package.
    /// Returns the handle, one welcome per added member, and the group
    /// evolution event payload (published as kind 445).
    async fn create_group(
        &self,
        creator_pubkey_hex: &str,
        member_key_packages: &[String],
        name: &str,
        description: &str,
        admin_pubkeys: &[String],
        relay_urls: &[String],
    ) -> Result<(EngineGroup, Vec<String>, String)>;

    /// Join a group from a welcome. `wrapper_id` is the id of the
    /// gift wrap the welcome arrived in, used by the engine for replay
    /// protection.
    async fn process_welcome(&self, wrapper_id: &str, welcome_json: &str) -> Result<EngineGroup>;

    /// Encrypt an inner event for the group; returns the kind-445 event
    /// JSON, signed by the engine with a per-message ephemeral key.
    async fn send_message(&self, group_id: &str, inner_event_json: &str) -> Result<String>;

    /// Process an inbound kind-445 event.
    async fn process_message(&self, event_json: &str) -> Result<EngineMessage>;

    /// Add a member; returns `(welcome_json, commit_json)`. The caller
    /// publishes the commit as kind 445 and delivers the welcome
    /// gift-wrapped as kind 444.
    async fn add_member(&self, group_id: &str, key_package_json: &str)
        -> Result<(String, String)>;

    /// Remove a member; returns the commit JSON to publish as kind 445.
    /// Removal advances the epoch, cutting the member off from future
    /// messages.
    async fn remove_member(&self, group_id: &str, member_pubkey_hex: &str) -> Result<String>;

    /// Encrypt a media blob under the group's current epoch secret.
    async fn encrypt_media(
        &self,
        group_id: &str,
        plaintext: &[u8],
        content_type: &str,
        filename: &str,
    ) -> Result<MediaCiphertext>;

    /// Decrypt a downloaded blob using the parameters in its imeta tag.
    async fn decrypt_media(
        &self,
        group_id: &str,
        ciphertext: &[u8],
        imeta: &Imeta,
    ) -> Result<Vec<u8>>;
}
