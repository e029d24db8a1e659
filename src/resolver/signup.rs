//! Signup resolver.
//!
//! A signup is never created without resolved shift and location ids; the
//! reconciler resolves those first and passes them in. The create writes the
//! signup and its nested person in one scheduled operation at the signup
//! tier, so it is always admitted after any pending event-tier writes.

use tracing::error;

use crate::model::SignupTree;
use crate::scheduler::{WriteScheduler, PRIORITY_SIGNUP};
use crate::store::{SharedStore, SignupRecord};
use crate::types::Result;

pub struct SignupResolver {
    store: SharedStore,
    scheduler: WriteScheduler,
}

impl SignupResolver {
    pub fn new(store: SharedStore, scheduler: WriteScheduler) -> Self {
        Self { store, scheduler }
    }

    pub async fn find(&self, external_id: i64) -> Result<Option<SignupRecord>> {
        self.store.lock().await.find_signup(external_id)
    }

    /// Return the existing signup for this external id, or schedule a
    /// priority-2 create wiring in the given parent ids.
    pub async fn find_or_create(
        &self,
        signup: &SignupTree,
        event_id: i64,
        shift_id: i64,
        location_id: i64,
    ) -> Result<SignupRecord> {
        if let Some(existing) = self.find(signup.external_id).await? {
            return Ok(existing);
        }

        let external_id = signup.external_id;
        let store = self.store.clone();
        let signup = signup.clone();
        self.scheduler
            .schedule(PRIORITY_SIGNUP, move || async move {
                store
                    .lock()
                    .await
                    .create_signup(&signup, event_id, shift_id, location_id)
            })
            .await
            .map_err(|err| {
                error!(external_id, error = %err, "signup create failed");
                err
            })
    }

    /// Update the signup's own attributes (its status).
    pub async fn update(&self, signup: &SignupRecord, inbound: &SignupTree) -> Result<SignupRecord> {
        let id = signup.id;
        let external_id = signup.external_id;
        let store = self.store.clone();
        let inbound = inbound.clone();
        self.scheduler
            .schedule(PRIORITY_SIGNUP, move || async move {
                store.lock().await.update_signup(id, &inbound)
            })
            .await
            .map_err(|err| {
                error!(external_id, error = %err, "signup update failed");
                err
            })
    }
}
