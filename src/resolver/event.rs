//! Event resolver.
//!
//! Lookup-before-create on the external id is mandatory: an existing event
//! is returned untouched and routes the reconciler to the update branch.
//! The create writes the event with its nested shifts and location in one
//! scheduled operation at the event tier, mirroring the single nested
//! insert the tree arrives as.

use tracing::error;

use crate::model::EventTree;
use crate::scheduler::{WriteScheduler, PRIORITY_EVENT};
use crate::store::{EventRecord, SharedStore};
use crate::types::Result;

pub struct EventResolver {
    store: SharedStore,
    scheduler: WriteScheduler,
}

impl EventResolver {
    pub fn new(store: SharedStore, scheduler: WriteScheduler) -> Self {
        Self { store, scheduler }
    }

    pub async fn find(&self, external_id: i64) -> Result<Option<EventRecord>> {
        self.store.lock().await.find_event(external_id)
    }

    /// Return the existing event for this external id, or schedule a
    /// priority-1 create of the full nested row set.
    pub async fn find_or_create(&self, tree: &EventTree) -> Result<EventRecord> {
        if let Some(existing) = self.find(tree.external_id).await? {
            return Ok(existing);
        }

        let external_id = tree.external_id;
        let store = self.store.clone();
        let tree = tree.clone();
        self.scheduler
            .schedule(PRIORITY_EVENT, move || async move {
                store.lock().await.create_event_tree(&tree)
            })
            .await
            .map_err(|err| {
                error!(external_id, error = %err, "event create failed");
                err
            })
    }

    /// Update the event's own attributes. Never touches the external id.
    pub async fn update(&self, event: &EventRecord, tree: &EventTree) -> Result<EventRecord> {
        let id = event.id;
        let external_id = event.external_id;
        let store = self.store.clone();
        let tree = tree.clone();
        self.scheduler
            .schedule(PRIORITY_EVENT, move || async move {
                store.lock().await.update_event(id, &tree)
            })
            .await
            .map_err(|err| {
                error!(external_id, error = %err, "event update failed");
                err
            })
    }
}
