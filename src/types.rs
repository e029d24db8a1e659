//! Crate-wide error and result types.
//!
//! Failures are typed rather than swallowed: a store write that fails
//! surfaces as a `SyncError` to the caller, so a failed parent write
//! short-circuits dependent child writes instead of leaving them to
//! dereference a missing id.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("write scheduler is closed")]
    SchedulerClosed,

    #[error("event {event_external_id} has no shift to attach the signup to")]
    MissingShift { event_external_id: i64 },

    #[error("event {event_external_id} has no location to attach the signup to")]
    MissingLocation { event_external_id: i64 },

    #[error("signup {signup_external_id} has no person record")]
    MissingPerson { signup_external_id: i64 },

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream returned {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error("downstream request failed: {0}")]
    Downstream(String),

    #[error("downstream returned {status} for {endpoint}")]
    DownstreamStatus { status: u16, endpoint: String },
}
