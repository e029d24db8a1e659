//! Tree reconciler — walks an inbound event tree and drives the resolvers
//! in dependency order.
//!
//! Routing: an event whose external id is unknown at reconciliation start
//! takes the create branch, a known id takes the update branch. The event
//! write must settle before any signup write is admitted; sibling signups
//! run concurrently and are isolated from each other's failures.
//!
//! Positional pairing policy for shifts on update is zip-truncate: shift i
//! updates from inbound shift i, extra inbound shifts are ignored, extra
//! existing shifts are left untouched. An event first sighted without a
//! location gets one attached on the next pass that carries it; inbound
//! trees with no location leave the existing one alone.

use futures::future::join_all;
use tracing::{info, warn};

use crate::model::{EventTree, SignupTree};
use crate::resolver::Resolvers;
use crate::scheduler::WriteScheduler;
use crate::store::{EventRecord, SharedStore, SignupRecord};
use crate::types::{Result, SyncError};

/// The materialized subtree with assigned identifiers, plus the route taken
/// and any per-signup failures.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub event: EventRecord,
    pub created: bool,
    pub signups: Vec<SignupRecord>,
    pub failures: Vec<SignupFailure>,
}

/// A signup that could not be reconciled. Its siblings were unaffected.
#[derive(Debug)]
pub struct SignupFailure {
    pub external_id: i64,
    pub error: SyncError,
}

pub struct Reconciler {
    resolvers: Resolvers,
}

impl Reconciler {
    pub fn new(store: SharedStore, scheduler: WriteScheduler) -> Self {
        Self {
            resolvers: Resolvers::new(store, scheduler),
        }
    }

    pub async fn reconcile_many(&self, trees: &[EventTree]) -> Vec<Result<ReconcileOutcome>> {
        join_all(trees.iter().map(|tree| self.reconcile(tree))).await
    }

    /// Reconcile one inbound tree. Returns an error only when the event
    /// itself cannot be resolved or written; per-signup failures are
    /// reported in the outcome.
    pub async fn reconcile(&self, tree: &EventTree) -> Result<ReconcileOutcome> {
        match self.resolvers.events.find(tree.external_id).await? {
            Some(event) => self.update_tree(event, tree).await,
            None => self.create_tree(tree).await,
        }
    }

    /// Create branch: event (with nested shifts/location) first, then all
    /// signups concurrently. A failed event create returns without
    /// attempting any signup.
    async fn create_tree(&self, tree: &EventTree) -> Result<ReconcileOutcome> {
        let event = self.resolvers.events.find_or_create(tree).await?;
        let (signups, failures) = self.upsert_signups(&event, &tree.signups).await;
        info!(
            external_id = event.external_id,
            signups = signups.len(),
            failed = failures.len(),
            "event tree created"
        );
        Ok(ReconcileOutcome {
            event,
            created: true,
            signups,
            failures,
        })
    }

    /// Update branch: location, shifts (positional), the event's own
    /// attributes, then per-signup upserts.
    async fn update_tree(&self, event: EventRecord, tree: &EventTree) -> Result<ReconcileOutcome> {
        if let Some(inbound) = tree.locations.first() {
            match self.resolvers.locations.for_event(event.id).await? {
                Some(location) => self.resolvers.locations.update(&location, inbound).await?,
                // First sighted without a location: attach it now so signup
                // creates can resolve one.
                None => {
                    self.resolvers
                        .locations
                        .find_or_create(event.id, inbound)
                        .await?;
                }
            }
        }

        let existing = self.resolvers.shifts.for_event(event.id).await?;
        for (shift, attrs) in existing.iter().zip(tree.shifts.iter()) {
            self.resolvers.shifts.update(shift, attrs).await?;
        }

        let event = self.resolvers.events.update(&event, tree).await?;
        let (signups, failures) = self.upsert_signups(&event, &tree.signups).await;
        info!(
            external_id = event.external_id,
            signups = signups.len(),
            failed = failures.len(),
            "event tree updated"
        );
        Ok(ReconcileOutcome {
            event,
            created: false,
            signups,
            failures,
        })
    }

    async fn upsert_signups(
        &self,
        event: &EventRecord,
        inbound: &[SignupTree],
    ) -> (Vec<SignupRecord>, Vec<SignupFailure>) {
        let results = join_all(inbound.iter().map(|signup| async move {
            (signup.external_id, self.upsert_signup(event, signup).await)
        }))
        .await;

        let mut signups = Vec::new();
        let mut failures = Vec::new();
        for (external_id, result) in results {
            match result {
                Ok(record) => signups.push(record),
                Err(error) => {
                    warn!(external_id, error = %error, "signup reconciliation failed");
                    failures.push(SignupFailure { external_id, error });
                }
            }
        }
        (signups, failures)
    }

    async fn upsert_signup(
        &self,
        event: &EventRecord,
        signup: &SignupTree,
    ) -> Result<SignupRecord> {
        match self.resolvers.signups.find(signup.external_id).await? {
            Some(existing) => {
                let updated = self.resolvers.signups.update(&existing, signup).await?;
                let person = self
                    .resolvers
                    .people
                    .for_signup(existing.id)
                    .await?
                    .ok_or(SyncError::MissingPerson {
                        signup_external_id: signup.external_id,
                    })?;
                self.resolvers.people.update(&person, &signup.person).await?;
                Ok(updated)
            }
            None => self.create_signup(event, signup).await,
        }
    }

    async fn create_signup(
        &self,
        event: &EventRecord,
        signup: &SignupTree,
    ) -> Result<SignupRecord> {
        let shift = self
            .resolvers
            .shifts
            .resolve(event, signup.shift_external_id)
            .await?;
        let location = self
            .resolvers
            .locations
            .resolve(event, signup.location_external_id)
            .await?;
        self.resolvers
            .signups
            .find_or_create(signup, event.id, shift.id, location.id)
            .await
    }
}
