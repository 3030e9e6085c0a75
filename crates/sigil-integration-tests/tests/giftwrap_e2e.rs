//! Integration test: the NIP-59 double seal, sender to recipient.

use sigil_crypto::keys::Keypair;
use sigil_giftwrap::{unwrap, wrap_rumor, GiftWrapError};
use sigil_types::EventTemplate;

const NOW: u64 = 1_750_000_000;

fn rumor(content: &str) -> EventTemplate {
    EventTemplate {
        pubkey: String::new(),
        created_at: NOW,
        kind: 9,
        tags: vec![],
        content: content.to_string(),
    }
}

#[test]
fn double_seal_end_to_end() {
    let sender = Keypair::generate();
    let recipient = Keypair::generate();
    let third_party = Keypair::generate();

    let wrap = wrap_rumor(&rumor("hi"), &recipient.public, &sender.secret, NOW).expect("wrap");

    // The outer event is authored by neither participant.
    assert_ne!(wrap.pubkey, sender.public.to_hex());
    assert_ne!(wrap.pubkey, recipient.public.to_hex());

    // Recipient recovers the rumor with the sender attested.
    let opened = unwrap(&wrap, &recipient.secret).expect("unwrap");
    assert_eq!(opened.rumor.kind, 9);
    assert_eq!(opened.rumor.content, "hi");
    assert_eq!(opened.sender_pubkey_hex, sender.public.to_hex());

    // A third party gets an authentication failure, not garbage.
    assert!(matches!(
        unwrap(&wrap, &third_party.secret),
        Err(GiftWrapError::AuthFail)
    ));
}

#[test]
fn wraps_are_unlinkable_across_messages() {
    let sender = Keypair::generate();
    let recipient = Keypair::generate();

    let w1 = wrap_rumor(&rumor("one"), &recipient.public, &sender.secret, NOW).expect("wrap");
    let w2 = wrap_rumor(&rumor("two"), &recipient.public, &sender.secret, NOW).expect("wrap");

    // Fresh ephemeral author per wrap; nothing links the two events to
    // the same sender from the outside.
    assert_ne!(w1.pubkey, w2.pubkey);
    assert_ne!(w1.id, w2.id);
}

#[test]
fn unwrap_noise_is_rejected_cleanly() {
    let recipient = Keypair::generate();
    let not_a_wrap = sigil_crypto::event::finalize(
        &EventTemplate {
            pubkey: String::new(),
            created_at: NOW,
            kind: 1,
            tags: vec![],
            content: "just a note".to_string(),
        },
        &Keypair::generate().secret,
    )
    .expect("event");

    assert!(matches!(
        unwrap(&not_a_wrap, &recipient.secret),
        Err(GiftWrapError::KindMismatch(1))
    ));
}
