//! Per-entity find-or-create / update resolvers.
//!
//! Each resolver holds the shared store and a scheduler handle. Writes are
//! admitted through the scheduler at the entity's priority tier; lookups and
//! association reads go straight to the store. A write failure is logged
//! with its operation context at this boundary and then propagated as a
//! typed error, so callers that need the result (e.g. a generated id for a
//! child write) stop instead of continuing with partial data.

mod event;
mod location;
mod person;
mod shift;
mod signup;

pub use event::EventResolver;
pub use location::LocationResolver;
pub use person::PersonResolver;
pub use shift::ShiftResolver;
pub use signup::SignupResolver;

use crate::scheduler::WriteScheduler;
use crate::store::SharedStore;

/// The full resolver set, sharing one store and one scheduler.
pub struct Resolvers {
    pub events: EventResolver,
    pub shifts: ShiftResolver,
    pub locations: LocationResolver,
    pub signups: SignupResolver,
    pub people: PersonResolver,
}

impl Resolvers {
    pub fn new(store: SharedStore, scheduler: WriteScheduler) -> Self {
        Self {
            events: EventResolver::new(store.clone(), scheduler.clone()),
            shifts: ShiftResolver::new(store.clone(), scheduler.clone()),
            locations: LocationResolver::new(store.clone(), scheduler.clone()),
            signups: SignupResolver::new(store.clone(), scheduler.clone()),
            people: PersonResolver::new(store, scheduler),
        }
    }
}
