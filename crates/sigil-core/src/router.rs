//! Inbound event dispatch.
//!
//! Events from the relay stream are dispatched by kind: gift wraps are
//! unwrapped and their inner welcome/message forwarded to the group
//! layer, bare group messages go straight there, and relay-list events
//! feed the key-package discovery cache. Per-group ordering is enforced
//! by the group adapter; the router itself processes its queue in FIFO
//! order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sigil_giftwrap::{unwrap, GiftWrapError};
use sigil_mls::{GroupEngineAdapter, Processed};
use sigil_policy::verify_delegation_tag;
use sigil_types::encoding::short_id;
use sigil_types::{kind, Event};
use sigil_vault::SecretStore;

use crate::events::{CoreEvent, EventBus};
use crate::{CoreError, Result};

/// A peer's advertised key-package relay list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayListEntry {
    pub relay_urls: Vec<String>,
    pub seen_at: u64,
}

/// Routes inbound events to the right engine.
pub struct EventRouter {
    adapter: Arc<GroupEngineAdapter>,
    store: Arc<SecretStore>,
    bus: EventBus,
    relay_lists: Mutex<HashMap<String, RelayListEntry>>,
}

impl EventRouter {
    pub fn new(adapter: Arc<GroupEngineAdapter>, store: Arc<SecretStore>, bus: EventBus) -> Self {
        Self {
            adapter,
            store,
            bus,
            relay_lists: Mutex::new(HashMap::new()),
        }
    }

    /// Drain a subscription channel until it closes or `cancel` fires.
    /// Events are processed strictly in arrival order.
    pub async fn run(&self, mut rx: mpsc::Receiver<String>, cancel: CancellationToken) {
        loop {
            let event_json = tokio::select! {
                () = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(json) => json,
                    None => break,
                },
            };
            if let Err(e) = self.route(&event_json).await {
                tracing::warn!(error = %e, "inbound event dropped");
            }
        }
    }

    /// Dispatch one inbound event.
    pub async fn route(&self, event_json: &str) -> Result<()> {
        let event = Event::from_json(event_json)
            .map_err(|e| CoreError::ProtocolViolation(e.to_string()))?;

        // Inbound delegated events must carry a valid delegation; bad
        // ones are dropped here, before any engine sees them.
        if let Some(tag) = event
            .tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some("delegation"))
        {
            if let Err(e) = verify_delegation_tag(tag, &event.pubkey, event.kind, event.created_at)
            {
                tracing::warn!(
                    id = %short_id(&event.id),
                    error = %e,
                    "dropping event with invalid delegation"
                );
                return Ok(());
            }
        }

        match event.kind {
            // Fetched on demand; nothing to do inline.
            kind::KEY_PACKAGE => Ok(()),
            kind::GIFT_WRAP => self.route_gift_wrap(&event).await,
            kind::WELCOME => {
                // Rare: a welcome that arrived outside a gift wrap.
                let group = self.adapter.process_welcome(&event.id, &event.content).await?;
                self.emit_welcome(&group.mls_group_id);
                Ok(())
            }
            kind::GROUP_MESSAGE => self.route_group_message(event_json).await,
            kind::KEY_PACKAGE_RELAYS => {
                self.cache_relay_list(&event);
                Ok(())
            }
            other => {
                tracing::debug!(kind = other, "ignoring unhandled event kind");
                Ok(())
            }
        }
    }

    /// The cached key-package relay list for a peer.
    pub fn relay_list(&self, pubkey_hex: &str) -> Option<RelayListEntry> {
        lock(&self.relay_lists).get(pubkey_hex).cloned()
    }

    async fn route_gift_wrap(&self, event: &Event) -> Result<()> {
        let Some(recipient_hex) = event.tag_value("p") else {
            tracing::debug!(id = %short_id(&event.id), "gift wrap without p tag");
            return Ok(());
        };
        // Only wraps addressed to a locally held identity are ours.
        let Some((secret, _)) = self.store.lookup(recipient_hex).await? else {
            return Ok(());
        };

        let opened = match unwrap(event, &secret) {
            Ok(opened) => opened,
            Err(GiftWrapError::AuthFail) => {
                // Addressed to us but keyed elsewhere; not for this identity.
                tracing::debug!(id = %short_id(&event.id), "gift wrap not decryptable");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(id = %short_id(&event.id), error = %e, "tampered gift wrap");
                return Ok(());
            }
        };

        match opened.rumor.kind {
            kind::WELCOME => {
                let group = self
                    .adapter
                    .process_welcome(&event.id, &opened.rumor.content)
                    .await?;
                self.emit_welcome(&group.mls_group_id);
            }
            kind::GROUP_MESSAGE => {
                // A group message delivered wrapped; content is the
                // kind-445 event itself.
                Box::pin(self.route_group_message(&opened.rumor.content)).await?;
            }
            other => {
                tracing::debug!(kind = other, "dropping unexpected wrapped kind");
            }
        }
        Ok(())
    }

    async fn route_group_message(&self, event_json: &str) -> Result<()> {
        match self.adapter.process_message(event_json).await? {
            Processed::Application {
                group_id,
                inner_event_json,
            } => {
                self.bus.emit(CoreEvent::MessageReceived {
                    group_id_hex: group_id,
                    inner_event_json,
                });
            }
            Processed::Commit { group_id, epoch } => {
                self.bus.emit(CoreEvent::GroupUpdated {
                    group_id_hex: group_id,
                    epoch,
                });
            }
            Processed::OwnMessage | Processed::Other => {}
        }
        Ok(())
    }

    fn cache_relay_list(&self, event: &Event) {
        let relay_urls: Vec<String> = event.tag_values("relay").map(str::to_string).collect();
        lock(&self.relay_lists).insert(
            event.pubkey.clone(),
            RelayListEntry {
                relay_urls,
                seen_at: event.created_at,
            },
        );
    }

    fn emit_welcome(&self, group_id: &str) {
        self.bus.emit(CoreEvent::WelcomeReceived {
            group_id_hex: group_id.to_string(),
        });
        self.bus.emit(CoreEvent::GroupJoined {
            group_id_hex: group_id.to_string(),
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_crypto::event as event_codec;
    use sigil_crypto::keys::Keypair;
    use sigil_giftwrap::wrap_rumor;
    use sigil_mls::store::GroupStore;
    use sigil_mls::testing::MemoryEngine;
    use sigil_mls::MlsEngine;
    use sigil_types::EventTemplate;
    use sigil_vault::MemoryVault;

    const NOW: u64 = 1_750_000_000;

    struct Fixture {
        router: EventRouter,
        adapter: Arc<GroupEngineAdapter>,
        bus: EventBus,
        me: Keypair,
    }

    async fn fixture() -> Fixture {
        let engine = Arc::new(MemoryEngine::new());
        let adapter = Arc::new(GroupEngineAdapter::new(
            engine.clone(),
            GroupStore::open_memory().expect("store"),
        ));
        let vault = Arc::new(MemoryVault::new());
        let store = Arc::new(SecretStore::new(vault));
        let bus = EventBus::default();

        let me = Keypair::generate();
        let npub = me.public.to_npub().expect("npub");
        store.add(&npub, &me.secret, "me").await.expect("add");

        Fixture {
            router: EventRouter::new(adapter.clone(), store, bus.clone()),
            adapter,
            bus,
            me,
        }
    }

    #[tokio::test]
    async fn test_wrapped_welcome_joins_group() {
        let f = fixture().await;
        let mut rx = f.bus.subscribe();
        let sender = Keypair::generate();

        // The sender's engine creates a group that includes us.
        let sender_engine = MemoryEngine::new();
        let our_kp = sender_engine
            .create_key_package(&f.me.public.to_hex())
            .await
            .expect("kp");
        let (_, welcomes, _) = sender_engine
            .create_group(&sender.public.to_hex(), &[our_kp], "club", "", &[], &[])
            .await
            .expect("create");

        let rumor = EventTemplate {
            pubkey: String::new(),
            created_at: NOW,
            kind: kind::WELCOME,
            tags: vec![],
            content: welcomes[0].clone(),
        };
        let wrap = wrap_rumor(&rumor, &f.me.public, &sender.secret, NOW).expect("wrap");

        f.router.route(&wrap.to_json()).await.expect("route");

        assert!(matches!(
            rx.try_recv().expect("event"),
            CoreEvent::WelcomeReceived { .. }
        ));
        assert!(matches!(
            rx.try_recv().expect("event"),
            CoreEvent::GroupJoined { .. }
        ));
        assert_eq!(f.adapter.list_groups(None).expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_group_message_emits_message_received() {
        let f = fixture().await;
        let mut rx = f.bus.subscribe();

        let (group, _, _) = f
            .adapter
            .create_group(&f.me.public.to_hex(), &[], "g", "", &[], &[])
            .await
            .expect("create");

        // A message from another member's engine.
        let other_engine = MemoryEngine::new();
        let state_welcome = {
            let own_kp = other_engine
                .create_key_package(&"bb".repeat(32))
                .await
                .expect("kp");
            // Simplest path: the other member joins via add_member.
            let (welcome, commit) = f
                .adapter
                .add_member(&group.mls_group_id, &own_kp)
                .await
                .expect("add");
            f.router.route(&commit).await.expect("commit routed");
            welcome
        };
        other_engine
            .process_welcome(&"00".repeat(32), &state_welcome)
            .await
            .expect("join");

        let inner = format!(
            "{{\"id\":\"{}\",\"pubkey\":\"{}\",\"created_at\":{NOW},\"kind\":9,\"tags\":[],\"content\":\"hey\"}}",
            "ab".repeat(32),
            "bb".repeat(32)
        );
        let wire = other_engine
            .send_message(&group.mls_group_id, &inner)
            .await
            .expect("send");

        f.router.route(&wire).await.expect("route");

        // First event is the commit's GroupUpdated, then the message.
        assert!(matches!(
            rx.try_recv().expect("event"),
            CoreEvent::GroupUpdated { epoch: 1, .. }
        ));
        let message = rx.try_recv().expect("event");
        assert!(
            matches!(message, CoreEvent::MessageReceived { ref inner_event_json, .. }
                if inner_event_json.contains("hey"))
        );
    }

    #[tokio::test]
    async fn test_foreign_gift_wrap_ignored() {
        let f = fixture().await;
        let sender = Keypair::generate();
        let other_recipient = Keypair::generate();

        let rumor = EventTemplate {
            pubkey: String::new(),
            created_at: NOW,
            kind: kind::WELCOME,
            tags: vec![],
            content: "{}".to_string(),
        };
        let wrap =
            wrap_rumor(&rumor, &other_recipient.public, &sender.secret, NOW).expect("wrap");

        // Not addressed to any local identity: dropped quietly.
        f.router.route(&wrap.to_json()).await.expect("route");
        assert!(f.adapter.list_groups(None).expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_relay_list_cached() {
        let f = fixture().await;
        let author = Keypair::generate();
        let event = event_codec::finalize(
            &EventTemplate {
                pubkey: String::new(),
                created_at: NOW,
                kind: kind::KEY_PACKAGE_RELAYS,
                tags: vec![
                    vec!["relay".to_string(), "wss://a.example".to_string()],
                    vec!["relay".to_string(), "wss://b.example".to_string()],
                ],
                content: String::new(),
            },
            &author.secret,
        )
        .expect("event");

        f.router.route(&event.to_json()).await.expect("route");

        let cached = f
            .router
            .relay_list(&author.public.to_hex())
            .expect("cached");
        assert_eq!(cached.relay_urls, vec!["wss://a.example", "wss://b.example"]);
        assert_eq!(cached.seen_at, NOW);
    }

    #[tokio::test]
    async fn test_invalid_delegation_dropped() {
        let f = fixture().await;
        let author = Keypair::generate();

        let (group, _, _) = f
            .adapter
            .create_group(&f.me.public.to_hex(), &[], "g", "", &[], &[])
            .await
            .expect("create");

        // A 445 with a forged delegation tag never reaches the engine.
        let mut tags = vec![vec!["h".to_string(), group.mls_group_id.clone()]];
        tags.push(vec![
            "delegation".to_string(),
            "cc".repeat(32),
            "kind=1".to_string(),
            "00".repeat(64),
        ]);
        let event = event_codec::finalize(
            &EventTemplate {
                pubkey: String::new(),
                created_at: NOW,
                kind: kind::GROUP_MESSAGE,
                tags,
                content: "commit:9".to_string(),
            },
            &author.secret,
        )
        .expect("event");

        f.router.route(&event.to_json()).await.expect("route");
        let stored = f
            .adapter
            .group(&group.mls_group_id)
            .expect("query")
            .expect("present");
        assert_eq!(stored.epoch, 0);
    }

    #[tokio::test]
    async fn test_key_package_events_are_inert() {
        let f = fixture().await;
        let author = Keypair::generate();
        let event = event_codec::finalize(
            &EventTemplate {
                pubkey: String::new(),
                created_at: NOW,
                kind: kind::KEY_PACKAGE,
                tags: vec![],
                content: "opaque".to_string(),
            },
            &author.secret,
        )
        .expect("event");
        f.router.route(&event.to_json()).await.expect("route");
        assert_eq!(f.bus.sequence(), 0);
    }

    #[tokio::test]
    async fn test_run_drains_channel_in_order() {
        let f = fixture().await;
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let author = Keypair::generate();
        let relay_list = |url: &str, created_at: u64| {
            event_codec::finalize(
                &EventTemplate {
                    pubkey: String::new(),
                    created_at,
                    kind: kind::KEY_PACKAGE_RELAYS,
                    tags: vec![vec!["relay".to_string(), url.to_string()]],
                    content: String::new(),
                },
                &author.secret,
            )
            .expect("event")
        };
        tx.send(relay_list("wss://first.example", NOW).to_json())
            .await
            .expect("send");
        tx.send(relay_list("wss://second.example", NOW + 1).to_json())
            .await
            .expect("send");
        drop(tx);

        f.router.run(rx, cancel).await;

        // FIFO: the later list wins the cache.
        let cached = f
            .router
            .relay_list(&author.public.to_hex())
            .expect("cached");
        assert_eq!(cached.relay_urls, vec!["wss://second.example"]);
        assert_eq!(cached.seen_at, NOW + 1);
    }
}
