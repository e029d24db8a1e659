//! Location resolver.
//!
//! A location is normally created with its event and updated in place from
//! then on; it is never recreated once linked. An event first sighted
//! without one gets the location attached on the next pass that carries it.

use tracing::error;

use crate::model::LocationAttrs;
use crate::scheduler::{WriteScheduler, PRIORITY_EVENT};
use crate::store::{EventRecord, LocationRecord, SharedStore};
use crate::types::{Result, SyncError};

pub struct LocationResolver {
    store: SharedStore,
    scheduler: WriteScheduler,
}

impl LocationResolver {
    pub fn new(store: SharedStore, scheduler: WriteScheduler) -> Self {
        Self { store, scheduler }
    }

    /// The location attached to an event, if any.
    pub async fn for_event(&self, event_id: i64) -> Result<Option<LocationRecord>> {
        self.store.lock().await.event_location(event_id)
    }

    /// Resolve the location a signup should attach to: the explicit
    /// external-id reference when known, otherwise the event's location.
    pub async fn resolve(
        &self,
        event: &EventRecord,
        reference: Option<i64>,
    ) -> Result<LocationRecord> {
        let store = self.store.lock().await;
        if let Some(external_id) = reference {
            if let Some(location) = store.find_location(external_id)? {
                return Ok(location);
            }
        }
        store
            .event_location(event.id)?
            .ok_or(SyncError::MissingLocation {
                event_external_id: event.external_id,
            })
    }

    /// Return the event's existing location, or schedule a priority-1
    /// create attaching the inbound one.
    pub async fn find_or_create(
        &self,
        event_id: i64,
        attrs: &LocationAttrs,
    ) -> Result<LocationRecord> {
        if let Some(existing) = self.for_event(event_id).await? {
            return Ok(existing);
        }

        let external_id = attrs.external_id;
        let store = self.store.clone();
        let attrs = attrs.clone();
        self.scheduler
            .schedule(PRIORITY_EVENT, move || async move {
                store.lock().await.create_location(event_id, &attrs)
            })
            .await
            .map_err(|err| {
                error!(external_id, error = %err, "location create failed");
                err
            })
    }

    pub async fn update(&self, location: &LocationRecord, attrs: &LocationAttrs) -> Result<()> {
        let id = location.id;
        let external_id = location.external_id;
        let store = self.store.clone();
        let attrs = attrs.clone();
        self.scheduler
            .schedule(PRIORITY_EVENT, move || async move {
                store.lock().await.update_location(id, &attrs)
            })
            .await
            .map_err(|err| {
                error!(external_id, error = %err, "location update failed");
                err
            })
    }
}
