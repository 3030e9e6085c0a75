//! Observable projections of stored groups and messages.
//!
//! Models pull from the group store on demand and expose the event-bus
//! subscription that tells a UI when to re-pull. No engine state leaks
//! into a model; snapshots are plain data.

use std::sync::Arc;

use tokio::sync::broadcast;

use sigil_mls::store::StoredMessage;
use sigil_mls::GroupEngineAdapter;
use sigil_types::group::{GroupInfo, GroupStatus};

use crate::events::{CoreEvent, EventBus};
use crate::Result;

/// Projection of the group list.
pub struct GroupListModel {
    adapter: Arc<GroupEngineAdapter>,
    bus: EventBus,
}

impl GroupListModel {
    pub fn new(adapter: Arc<GroupEngineAdapter>, bus: EventBus) -> Self {
        Self { adapter, bus }
    }

    /// Current snapshot of all groups.
    pub fn snapshot(&self) -> Result<Vec<GroupInfo>> {
        Ok(self.adapter.list_groups(None)?)
    }

    /// Active groups only.
    pub fn active(&self) -> Result<Vec<GroupInfo>> {
        Ok(self.adapter.list_groups(Some(GroupStatus::Active))?)
    }

    /// Events that should trigger a re-pull.
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.bus.subscribe()
    }

    /// Whether an event invalidates this model's snapshot.
    pub fn is_relevant(event: &CoreEvent) -> bool {
        matches!(
            event,
            CoreEvent::GroupCreated { .. }
                | CoreEvent::GroupJoined { .. }
                | CoreEvent::GroupUpdated { .. }
                | CoreEvent::WelcomeReceived { .. }
        )
    }
}

/// Projection of one group's message history.
pub struct MessageListModel {
    adapter: Arc<GroupEngineAdapter>,
    bus: EventBus,
    group_id: String,
}

impl MessageListModel {
    pub fn new(adapter: Arc<GroupEngineAdapter>, bus: EventBus, group_id: String) -> Self {
        Self {
            adapter,
            bus,
            group_id,
        }
    }

    /// Messages in arrival order.
    pub fn snapshot(&self) -> Result<Vec<StoredMessage>> {
        Ok(self.adapter.messages(&self.group_id)?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.bus.subscribe()
    }

    /// Whether an event belongs to this model's group.
    pub fn is_relevant(&self, event: &CoreEvent) -> bool {
        matches!(
            event,
            CoreEvent::MessageReceived { group_id_hex, .. } if *group_id_hex == self.group_id
        )
    }
}
