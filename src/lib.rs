//! rostersync - reconciles upstream event trees into a local store and a
//! downstream REST system
//!
//! The upstream system periodically emits complete event trees (event,
//! shifts, location, signups each nesting a person). Per node, rostersync
//! decides whether to create or update the local record, serializing
//! dependent writes through a priority-ordered scheduler, then fans the
//! materialized tree out to the downstream REST system.
//!
//! ## Components
//!
//! - **Scheduler**: single-lane, priority-ordered admission gate for store writes
//! - **Resolvers**: per-entity find-or-create / update against the store
//! - **Reconciler**: walks inbound trees and drives resolvers in dependency order
//! - **Bridge**: maps local records to downstream remote ids over REST
//! - **Upstream**: read-only fetcher assembling nested event trees

pub mod bridge;
pub mod config;
pub mod model;
pub mod reconcile;
pub mod resolver;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod upstream;

pub use config::Config;
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use scheduler::{WriteScheduler, PRIORITY_EVENT, PRIORITY_SIGNUP};
pub use store::{SharedStore, Store};
pub use types::{Result, SyncError};
