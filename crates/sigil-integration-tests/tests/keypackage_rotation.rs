//! Integration test: kind-443 publication discipline.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sigil_crypto::keys::Keypair;
use sigil_mls::testing::{MemoryEngine, MockRelay};
use sigil_mls::{KeyPackageManager, RelayClient};
use sigil_types::kind;

const NOW: u64 = 1_750_000_000;

#[tokio::test]
async fn startup_publishes_exactly_one() {
    let relay = Arc::new(MockRelay::new());
    let manager = KeyPackageManager::new(Arc::new(MemoryEngine::new()), relay.clone());
    let keys = Keypair::generate();
    let cancel = CancellationToken::new();

    // No package on relays: the first ensure publishes one.
    assert!(manager
        .ensure_key_package(&keys.secret, &[], NOW, &cancel)
        .await
        .expect("ensure"));
    assert_eq!(relay.published_of_kind(kind::KEY_PACKAGE).len(), 1);

    // Within the rotation interval: zero further publishes.
    assert!(!manager
        .ensure_key_package(&keys.secret, &[], NOW + 3600, &cancel)
        .await
        .expect("ensure"));
    assert_eq!(relay.published_of_kind(kind::KEY_PACKAGE).len(), 1);
}

#[tokio::test]
async fn rotation_interval_elapses() {
    let relay = Arc::new(MockRelay::new());
    // One-hour rotation so the test can cross the boundary.
    let manager = KeyPackageManager::with_rotation(
        Arc::new(MemoryEngine::new()),
        relay.clone() as Arc<dyn RelayClient>,
        Duration::from_secs(3600),
    );
    let keys = Keypair::generate();
    let cancel = CancellationToken::new();

    manager
        .ensure_key_package(&keys.secret, &[], NOW, &cancel)
        .await
        .expect("ensure");

    // Past the interval the relay still holds a live package, so ensure
    // refreshes its memory without publishing a duplicate.
    assert!(!manager
        .ensure_key_package(&keys.secret, &[], NOW + 3601, &cancel)
        .await
        .expect("ensure"));

    // rotate() is the forced path.
    manager
        .rotate(&keys.secret, &[], NOW + 3602, &cancel)
        .await
        .expect("rotate");
    assert_eq!(relay.published_of_kind(kind::KEY_PACKAGE).len(), 2);
}

#[tokio::test]
async fn relay_hints_and_expiry_on_the_wire() {
    let relay = Arc::new(MockRelay::new());
    let manager = KeyPackageManager::new(Arc::new(MemoryEngine::new()), relay.clone());
    let keys = Keypair::generate();
    let cancel = CancellationToken::new();

    manager
        .rotate(
            &keys.secret,
            &["wss://kp.example".to_string()],
            NOW,
            &cancel,
        )
        .await
        .expect("rotate");

    let events = relay.published_of_kind(kind::KEY_PACKAGE);
    let expiry: u64 = events[0]
        .tag_value("expiration")
        .expect("expiration tag")
        .parse()
        .expect("numeric");
    assert!(expiry > NOW);
    assert_eq!(events[0].tag_value("relays"), Some("wss://kp.example"));
    // Content carries the engine's key package for this identity.
    assert!(events[0].content.contains(&keys.public.to_hex()));
}
