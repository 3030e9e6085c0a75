//! Compose and unwrap pipelines.

use serde::{Deserialize, Serialize};

use sigil_crypto::event as event_codec;
use sigil_crypto::keys::{Keypair, PublicKey, SecretKey};
use sigil_crypto::nip44::{self, ConversationKey};
use sigil_types::{kind, Event, EventTemplate};

use crate::{GiftWrapError, Result};

/// Timestamps on seals and wraps are pushed back a random amount up to
/// one day to frustrate traffic analysis. Never into the future, which
/// some relays reject.
const TIMESTAMP_JITTER_SECS: u64 = 86400;

/// A successfully opened gift wrap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unwrapped {
    /// The inner rumor. Unsigned by design; it is attested by the seal.
    pub rumor: EventTemplate,
    /// The seal's author, which the rumor's author must equal.
    pub sender_pubkey_hex: String,
}

/// The rumor wire form: an unsigned event carrying its precomputed id.
#[derive(Serialize, Deserialize)]
struct RumorJson {
    id: String,
    pubkey: String,
    created_at: u64,
    kind: u16,
    tags: Vec<Vec<String>>,
    content: String,
}

/// Gift-wrap `rumor` for `recipient`.
///
/// The rumor's `pubkey` is forced to the sender's public key before
/// sealing; a seal never attests someone else's rumor. The ephemeral
/// wrap key is dropped (and its bytes zeroized) before this function
/// returns.
pub fn wrap_rumor(
    rumor: &EventTemplate,
    recipient: &PublicKey,
    sender_secret: &SecretKey,
    now: u64,
) -> Result<Event> {
    let sender_pubkey_hex = sender_secret.public_key().to_hex();

    let mut rumor = rumor.clone();
    rumor.pubkey = sender_pubkey_hex;
    let rumor_json = serialize_rumor(&rumor);

    // Layer 1: the seal, signed by the sender.
    let seal_key = ConversationKey::derive(sender_secret, recipient)?;
    let seal_content = nip44::encrypt(&seal_key, &rumor_json)?;
    let seal = event_codec::finalize(
        &EventTemplate {
            pubkey: String::new(),
            created_at: jitter(now),
            kind: kind::SEAL,
            tags: Vec::new(),
            content: seal_content,
        },
        sender_secret,
    )?;

    // Layer 2: the wrap, signed by a single-use ephemeral key.
    let ephemeral = Keypair::generate();
    let wrap_key = ConversationKey::derive(&ephemeral.secret, recipient)?;
    let wrap_content = nip44::encrypt(&wrap_key, &seal.to_json())?;
    let wrap = event_codec::finalize(
        &EventTemplate {
            pubkey: String::new(),
            created_at: jitter(now),
            kind: kind::GIFT_WRAP,
            tags: vec![vec!["p".to_string(), recipient.to_hex()]],
            content: wrap_content,
        },
        &ephemeral.secret,
    )?;
    drop(ephemeral);

    tracing::debug!(rumor_kind = rumor.kind, "gift wrap composed");
    Ok(wrap)
}

/// Open a kind-1059 wrap addressed to `recipient_secret`.
///
/// The rumor is not verified against its own signature; rumors are
/// unsigned by design and attested by living inside a seal signed by
/// the named author.
pub fn unwrap(wrap: &Event, recipient_secret: &SecretKey) -> Result<Unwrapped> {
    if wrap.kind != kind::GIFT_WRAP {
        return Err(GiftWrapError::KindMismatch(wrap.kind));
    }
    event_codec::verify_event(wrap).map_err(|_| GiftWrapError::SigFail)?;

    // Outer layer: ephemeral key to us.
    let wrap_author = PublicKey::parse(&wrap.pubkey)
        .map_err(|e| GiftWrapError::Malformed(e.to_string()))?;
    let wrap_key = ConversationKey::derive(recipient_secret, &wrap_author)?;
    let seal_json =
        nip44::decrypt(&wrap_key, &wrap.content).map_err(|_| GiftWrapError::AuthFail)?;

    let seal =
        Event::from_json(&seal_json).map_err(|e| GiftWrapError::Malformed(e.to_string()))?;
    if seal.kind != kind::SEAL {
        return Err(GiftWrapError::KindMismatch(seal.kind));
    }
    event_codec::verify_event(&seal).map_err(|_| GiftWrapError::SigFail)?;

    // Inner layer: sender to us.
    let seal_author = PublicKey::parse(&seal.pubkey)
        .map_err(|e| GiftWrapError::Malformed(e.to_string()))?;
    let seal_key = ConversationKey::derive(recipient_secret, &seal_author)?;
    let rumor_json =
        nip44::decrypt(&seal_key, &seal.content).map_err(|_| GiftWrapError::AuthFail)?;

    let rumor: RumorJson = serde_json::from_str(&rumor_json)
        .map_err(|e| GiftWrapError::Malformed(e.to_string()))?;
    if rumor.pubkey != seal.pubkey {
        return Err(GiftWrapError::AuthorMismatch);
    }

    Ok(Unwrapped {
        rumor: EventTemplate {
            pubkey: rumor.pubkey,
            created_at: rumor.created_at,
            kind: rumor.kind,
            tags: rumor.tags,
            content: rumor.content,
        },
        sender_pubkey_hex: seal.pubkey.clone(),
    })
}

fn serialize_rumor(rumor: &EventTemplate) -> String {
    let id = hex::encode(event_codec::template_id(rumor));
    serde_json::to_string(&RumorJson {
        id,
        pubkey: rumor.pubkey.clone(),
        created_at: rumor.created_at,
        kind: rumor.kind,
        tags: rumor.tags.clone(),
        content: rumor.content.clone(),
    })
    .unwrap_or_default()
}

fn jitter(now: u64) -> u64 {
    let offset = rand::Rng::gen_range(&mut rand::thread_rng(), 0..=TIMESTAMP_JITTER_SECS);
    now.saturating_sub(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_750_000_000;

    fn rumor(content: &str) -> EventTemplate {
        EventTemplate {
            pubkey: String::new(),
            created_at: NOW,
            kind: 9,
            tags: Vec::new(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let sender = Keypair::generate();
        let recipient = Keypair::generate();

        let wrap = wrap_rumor(&rumor("hi"), &recipient.public, &sender.secret, NOW)
            .expect("wrap");
        let opened = unwrap(&wrap, &recipient.secret).expect("unwrap");

        assert_eq!(opened.rumor.content, "hi");
        assert_eq!(opened.rumor.kind, 9);
        assert_eq!(opened.sender_pubkey_hex, sender.public.to_hex());
        assert_eq!(opened.rumor.pubkey, sender.public.to_hex());
    }

    #[test]
    fn test_outer_author_is_ephemeral() {
        let sender = Keypair::generate();
        let recipient = Keypair::generate();

        let wrap = wrap_rumor(&rumor("hi"), &recipient.public, &sender.secret, NOW)
            .expect("wrap");

        assert_ne!(wrap.pubkey, sender.public.to_hex());
        assert_ne!(wrap.pubkey, recipient.public.to_hex());
        assert_eq!(wrap.kind, kind::GIFT_WRAP);
        assert_eq!(wrap.tag_value("p"), Some(recipient.public.to_hex().as_str()));
    }

    #[test]
    fn test_ephemeral_keys_never_reused() {
        let sender = Keypair::generate();
        let recipient = Keypair::generate();

        let w1 = wrap_rumor(&rumor("a"), &recipient.public, &sender.secret, NOW).expect("wrap");
        let w2 = wrap_rumor(&rumor("b"), &recipient.public, &sender.secret, NOW).expect("wrap");
        assert_ne!(w1.pubkey, w2.pubkey);
    }

    #[test]
    fn test_third_party_cannot_open() {
        let sender = Keypair::generate();
        let recipient = Keypair::generate();
        let eavesdropper = Keypair::generate();

        let wrap = wrap_rumor(&rumor("hi"), &recipient.public, &sender.secret, NOW)
            .expect("wrap");
        assert!(matches!(
            unwrap(&wrap, &eavesdropper.secret),
            Err(GiftWrapError::AuthFail)
        ));
    }

    #[test]
    fn test_sender_cannot_open_own_wrap() {
        // The wrap layer is keyed to the recipient; even the sender
        // cannot reopen it.
        let sender = Keypair::generate();
        let recipient = Keypair::generate();

        let wrap = wrap_rumor(&rumor("hi"), &recipient.public, &sender.secret, NOW)
            .expect("wrap");
        assert!(matches!(
            unwrap(&wrap, &sender.secret),
            Err(GiftWrapError::AuthFail)
        ));
    }

    #[test]
    fn test_tampered_wrap_sig_fails() {
        let sender = Keypair::generate();
        let recipient = Keypair::generate();

        let mut wrap = wrap_rumor(&rumor("hi"), &recipient.public, &sender.secret, NOW)
            .expect("wrap");
        wrap.sig = "0".repeat(128);
        assert!(matches!(
            unwrap(&wrap, &recipient.secret),
            Err(GiftWrapError::SigFail)
        ));
    }

    #[test]
    fn test_wrong_outer_kind_rejected() {
        let sender = Keypair::generate();
        let recipient = Keypair::generate();

        let mut wrap = wrap_rumor(&rumor("hi"), &recipient.public, &sender.secret, NOW)
            .expect("wrap");
        wrap.kind = 1;
        assert!(matches!(
            unwrap(&wrap, &recipient.secret),
            Err(GiftWrapError::KindMismatch(1))
        ));
    }

    #[test]
    fn test_author_mismatch_detected() {
        // Hand-build a seal whose rumor claims a different author.
        let sender = Keypair::generate();
        let recipient = Keypair::generate();
        let impostor = Keypair::generate();

        let mut fake_rumor = rumor("forged");
        fake_rumor.pubkey = impostor.public.to_hex();
        let rumor_json = serialize_rumor(&fake_rumor);

        let seal_key = ConversationKey::derive(&sender.secret, &recipient.public)
            .expect("derive");
        let seal = event_codec::finalize(
            &EventTemplate {
                pubkey: String::new(),
                created_at: NOW,
                kind: kind::SEAL,
                tags: Vec::new(),
                content: nip44::encrypt(&seal_key, &rumor_json).expect("encrypt"),
            },
            &sender.secret,
        )
        .expect("seal");

        let ephemeral = Keypair::generate();
        let wrap_key = ConversationKey::derive(&ephemeral.secret, &recipient.public)
            .expect("derive");
        let wrap = event_codec::finalize(
            &EventTemplate {
                pubkey: String::new(),
                created_at: NOW,
                kind: kind::GIFT_WRAP,
                tags: vec![vec!["p".to_string(), recipient.public.to_hex()]],
                content: nip44::encrypt(&wrap_key, &seal.to_json()).expect("encrypt"),
            },
            &ephemeral.secret,
        )
        .expect("wrap");

        assert!(matches!(
            unwrap(&wrap, &recipient.secret),
            Err(GiftWrapError::AuthorMismatch)
        ));
    }

    #[test]
    fn test_timestamps_jittered_backwards() {
        let sender = Keypair::generate();
        let recipient = Keypair::generate();

        for _ in 0..8 {
            let wrap = wrap_rumor(&rumor("hi"), &recipient.public, &sender.secret, NOW)
                .expect("wrap");
            assert!(wrap.created_at <= NOW);
            assert!(wrap.created_at >= NOW - TIMESTAMP_JITTER_SECS);
        }
    }

    #[test]
    fn test_rumor_author_forced_to_sender() {
        let sender = Keypair::generate();
        let recipient = Keypair::generate();

        let mut lying_rumor = rumor("hi");
        lying_rumor.pubkey = "f".repeat(64);
        let wrap = wrap_rumor(&lying_rumor, &recipient.public, &sender.secret, NOW)
            .expect("wrap");
        let opened = unwrap(&wrap, &recipient.secret).expect("unwrap");
        assert_eq!(opened.rumor.pubkey, sender.public.to_hex());
    }
}
