//! The typed event bus.
//!
//! Engines push plain data records; UIs and models subscribe and pull.
//! No callback lifetimes cross this boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Events observable by the embedding application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoreEvent {
    SessionUnlocked,
    SessionLocked,
    IdentityAdded { npub: String },
    IdentityRemoved { npub: String },
    ApprovalRequested { application_id: String, kind: u16 },
    GroupCreated { group_id_hex: String },
    GroupJoined { group_id_hex: String },
    GroupUpdated { group_id_hex: String, epoch: u64 },
    WelcomeReceived { group_id_hex: String },
    MessageReceived {
        group_id_hex: String,
        inner_event_json: String,
    },
    KeyPackagePublished { pubkey_hex: String },
}

/// Broadcast bus carrying [`CoreEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event. Lagging or absent subscribers are not an error.
    pub fn emit(&self, event: CoreEvent) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
