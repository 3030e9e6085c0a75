//! Integration test: two cores bootstrap a DM over a shared relay.
//!
//! Alice opens a DM with Bob; the wrapped welcome travels through the
//! relay to Bob's router, Bob joins, and a message flows back.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use sigil_core::{Core, CoreConfig, CoreEvent};
use sigil_crypto::keys::Keypair;
use sigil_mls::testing::{MemoryEngine, MockRelay};
use sigil_types::kind;
use sigil_vault::MemoryVault;

const NOW: u64 = 1_750_000_000;

struct Node {
    core: Core,
    keys: Keypair,
}

async fn node(relay: Arc<MockRelay>) -> Node {
    let core = Core::new(
        CoreConfig::default(),
        Arc::new(MemoryVault::new()),
        Arc::new(MemoryEngine::new()),
        relay,
    )
    .expect("assemble");
    let keys = Keypair::generate();
    let npub = keys.public.to_npub().expect("npub");
    core.add_identity(&npub, &keys.secret, "me")
        .await
        .expect("add identity");
    Node { core, keys }
}

#[tokio::test]
async fn dm_bootstrap_and_message_flow() {
    let relay = Arc::new(MockRelay::new());
    let alice = node(relay.clone()).await;
    let bob = node(relay.clone()).await;
    let cancel = CancellationToken::new();

    // Bob's key package must be discoverable.
    bob.core
        .key_packages()
        .rotate(&bob.keys.secret, &[], NOW, &cancel)
        .await
        .expect("publish bob's key package");

    // Alice opens the DM.
    let group = alice
        .core
        .dm()
        .open_dm(&alice.keys.secret, &bob.keys.public.to_hex(), &[], NOW, &cancel)
        .await
        .expect("open dm");
    assert!(group.name.starts_with("dm:"));

    // The wrapped welcome reaches Bob's router.
    let mut bob_events = bob.core.bus().subscribe();
    let wraps = relay.published_of_kind(kind::GIFT_WRAP);
    assert_eq!(wraps.len(), 1);
    bob.core
        .router()
        .route(&wraps[0].to_json())
        .await
        .expect("bob routes welcome");

    assert!(matches!(
        bob_events.try_recv().expect("event"),
        CoreEvent::WelcomeReceived { .. }
    ));
    let bob_groups = bob.core.groups().list_groups(None).expect("list");
    assert_eq!(bob_groups.len(), 1);
    assert_eq!(bob_groups[0].mls_group_id, group.mls_group_id);

    // Bob answers inside the group.
    let inner = format!(
        "{{\"id\":\"{}\",\"pubkey\":\"{}\",\"created_at\":{NOW},\"kind\":9,\"tags\":[],\"content\":\"hey alice\"}}",
        "ab".repeat(32),
        bob.keys.public.to_hex()
    );
    let wire = bob
        .core
        .groups()
        .send_message(&group.mls_group_id, &inner)
        .await
        .expect("send");

    let mut alice_events = alice.core.bus().subscribe();
    alice
        .core
        .router()
        .route(&wire)
        .await
        .expect("alice routes message");
    let event = alice_events.try_recv().expect("event");
    assert!(matches!(
        event,
        CoreEvent::MessageReceived { ref inner_event_json, .. } if inner_event_json.contains("hey alice")
    ));

    // Alice's store now holds the message.
    let messages = alice
        .core
        .groups()
        .messages(&group.mls_group_id)
        .expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].author_pubkey, bob.keys.public.to_hex());
}

#[tokio::test]
async fn open_dm_is_idempotent() {
    let relay = Arc::new(MockRelay::new());
    let alice = node(relay.clone()).await;
    let bob = node(relay.clone()).await;
    let cancel = CancellationToken::new();

    bob.core
        .key_packages()
        .rotate(&bob.keys.secret, &[], NOW, &cancel)
        .await
        .expect("publish bob's key package");

    let first = alice
        .core
        .dm()
        .open_dm(&alice.keys.secret, &bob.keys.public.to_hex(), &[], NOW, &cancel)
        .await
        .expect("open");
    let fetches = relay.fetch_count();
    let wraps = relay.published_of_kind(kind::GIFT_WRAP).len();

    let second = alice
        .core
        .dm()
        .open_dm(
            &alice.keys.secret,
            &bob.keys.public.to_hex(),
            &[],
            NOW + 60,
            &cancel,
        )
        .await
        .expect("open again");

    // Same group, no new fetch, no new invite.
    assert_eq!(first.mls_group_id, second.mls_group_id);
    assert_eq!(relay.fetch_count(), fetches);
    assert_eq!(relay.published_of_kind(kind::GIFT_WRAP).len(), wraps);

    let dms = alice.core.dm().list_dms().expect("list");
    assert_eq!(dms.len(), 1);
}

#[tokio::test]
async fn dm_name_is_direction_independent() {
    let relay = Arc::new(MockRelay::new());
    let alice = node(relay.clone()).await;
    let bob = node(relay.clone()).await;
    let cancel = CancellationToken::new();

    alice
        .core
        .key_packages()
        .rotate(&alice.keys.secret, &[], NOW, &cancel)
        .await
        .expect("publish alice's key package");
    bob.core
        .key_packages()
        .rotate(&bob.keys.secret, &[], NOW, &cancel)
        .await
        .expect("publish bob's key package");

    let from_alice = alice
        .core
        .dm()
        .open_dm(&alice.keys.secret, &bob.keys.public.to_hex(), &[], NOW, &cancel)
        .await
        .expect("alice opens");
    let from_bob = bob
        .core
        .dm()
        .open_dm(&bob.keys.secret, &alice.keys.public.to_hex(), &[], NOW, &cancel)
        .await
        .expect("bob opens");

    // Both sides compute the same canonical name.
    assert_eq!(from_alice.name, from_bob.name);
}
