//! Person resolver.
//!
//! A person row is created with its signup; afterwards only its contact
//! attributes change, always following the owning signup's update.

use tracing::error;

use crate::model::PersonAttrs;
use crate::scheduler::{WriteScheduler, PRIORITY_SIGNUP};
use crate::store::{PersonRecord, SharedStore};
use crate::types::Result;

pub struct PersonResolver {
    store: SharedStore,
    scheduler: WriteScheduler,
}

impl PersonResolver {
    pub fn new(store: SharedStore, scheduler: WriteScheduler) -> Self {
        Self { store, scheduler }
    }

    pub async fn for_signup(&self, signup_id: i64) -> Result<Option<PersonRecord>> {
        self.store.lock().await.signup_person(signup_id)
    }

    pub async fn update(&self, person: &PersonRecord, attrs: &PersonAttrs) -> Result<()> {
        let id = person.id;
        let external_id = person.external_id;
        let store = self.store.clone();
        let attrs = attrs.clone();
        self.scheduler
            .schedule(PRIORITY_SIGNUP, move || async move {
                store.lock().await.update_person(id, &attrs)
            })
            .await
            .map_err(|err| {
                error!(external_id, error = %err, "person update failed");
                err
            })
    }
}
