//! NIP-41 key-migration announcements (kind 1776).
//!
//! The old key signs the event; the new key counter-signs a migration
//! token carried in the `new_sig` tag, so a migration cannot be forged
//! by either key alone.

use sha2::{Digest, Sha256};

use sigil_crypto::event as event_codec;
use sigil_crypto::keys::{PublicKey, SecretKey};
use sigil_types::{kind, Event, EventTemplate};

use crate::{CoreError, Result};

/// Build a signed key-migration event from `old` to `new`.
pub fn build_migration(old: &SecretKey, new: &SecretKey, now: u64) -> Result<Event> {
    let old_hex = old.public_key().to_hex();
    let new_hex = new.public_key().to_hex();

    let token = migration_token(&old_hex, &new_hex);
    let new_sig = event_codec::sign_id(new, &token)?;

    let template = EventTemplate {
        pubkey: String::new(),
        created_at: now,
        kind: kind::KEY_MIGRATION,
        tags: vec![
            vec!["p".to_string(), new_hex.clone()],
            vec!["alt".to_string(), "Key migration announcement".to_string()],
            vec!["new_sig".to_string(), hex::encode(new_sig)],
        ],
        content: format!("Migrating to new key: {new_hex}"),
    };
    Ok(event_codec::finalize(&template, old)?)
}

/// Validate an inbound migration event: correct kind and shape, outer
/// signature by the old key, counter-signature by the new key.
/// Returns `(old_pubkey_hex, new_pubkey_hex)`.
pub fn verify_migration(event: &Event) -> Result<(String, String)> {
    if event.kind != kind::KEY_MIGRATION {
        return Err(CoreError::ProtocolViolation(format!(
            "kind {} is not a migration",
            event.kind
        )));
    }
    event_codec::verify_event(event).map_err(|_| CoreError::SigFail)?;

    let new_hex = event
        .tag_value("p")
        .ok_or_else(|| CoreError::ProtocolViolation("migration without p tag".to_string()))?
        .to_string();
    let new_sig_hex = event
        .tag_value("new_sig")
        .ok_or_else(|| CoreError::ProtocolViolation("migration without new_sig".to_string()))?;

    let new_key = PublicKey::parse(&new_hex)?;
    let sig: [u8; 64] = hex::decode(new_sig_hex)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or_else(|| CoreError::ProtocolViolation("bad new_sig hex".to_string()))?;

    let token = migration_token(&event.pubkey, &new_hex);
    event_codec::verify_id(&new_key, &token, &sig).map_err(|_| CoreError::SigFail)?;

    Ok((event.pubkey.clone(), new_hex))
}

/// The counter-signed token binding the old and new keys.
fn migration_token(old_hex: &str, new_hex: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"nostr-key-migration:");
    hasher.update(old_hex.as_bytes());
    hasher.update(b":");
    hasher.update(new_hex.as_bytes());
    hasher.finalize().into()
}
