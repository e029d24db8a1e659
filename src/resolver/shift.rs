//! Shift resolver.
//!
//! Shifts are created as part of the event's nested insert; this resolver
//! handles positional updates and reference resolution for signups.

use tracing::error;

use crate::model::ShiftAttrs;
use crate::scheduler::{WriteScheduler, PRIORITY_EVENT};
use crate::store::{EventRecord, SharedStore, ShiftRecord};
use crate::types::{Result, SyncError};

pub struct ShiftResolver {
    store: SharedStore,
    scheduler: WriteScheduler,
}

impl ShiftResolver {
    pub fn new(store: SharedStore, scheduler: WriteScheduler) -> Self {
        Self { store, scheduler }
    }

    /// Shifts attached to an event, in positional order.
    pub async fn for_event(&self, event_id: i64) -> Result<Vec<ShiftRecord>> {
        self.store.lock().await.event_shifts(event_id)
    }

    /// Resolve the shift a signup should attach to: the explicit external-id
    /// reference when it names a known shift, otherwise the event's first
    /// shift.
    pub async fn resolve(
        &self,
        event: &EventRecord,
        reference: Option<i64>,
    ) -> Result<ShiftRecord> {
        let store = self.store.lock().await;
        if let Some(external_id) = reference {
            if let Some(shift) = store.find_shift(external_id)? {
                return Ok(shift);
            }
        }
        store
            .event_shifts(event.id)?
            .into_iter()
            .next()
            .ok_or(SyncError::MissingShift {
                event_external_id: event.external_id,
            })
    }

    pub async fn update(&self, shift: &ShiftRecord, attrs: &ShiftAttrs) -> Result<()> {
        let id = shift.id;
        let external_id = shift.external_id;
        let store = self.store.clone();
        let attrs = attrs.clone();
        self.scheduler
            .schedule(PRIORITY_EVENT, move || async move {
                store.lock().await.update_shift(id, &attrs)
            })
            .await
            .map_err(|err| {
                error!(external_id, error = %err, "shift update failed");
                err
            })
    }
}
