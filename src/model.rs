//! Inbound event tree model.
//!
//! The upstream system emits complete event trees: an event with its shifts,
//! a location list (first entry is the one the event owns), and signups each
//! nesting a person. Every node carries the upstream's stable external id,
//! which is the reconciliation key downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A complete event tree as emitted by the upstream system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTree {
    pub external_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shifts: Vec<ShiftAttrs>,
    #[serde(default)]
    pub locations: Vec<LocationAttrs>,
    #[serde(default)]
    pub signups: Vec<SignupTree>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftAttrs {
    pub external_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationAttrs {
    pub external_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
}

/// A signup nesting its person. Shift/location references are optional:
/// when absent, the reconciler falls back to the first shift/location
/// attached to the parent event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupTree {
    pub external_id: i64,
    pub status: SignupStatus,
    #[serde(default)]
    pub shift_external_id: Option<i64>,
    #[serde(default)]
    pub location_external_id: Option<i64>,
    pub person: PersonAttrs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonAttrs {
    pub external_id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Signup status. The numeric codes are assigned by the downstream system
/// and are stable; the store persists the code, the wire carries the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignupStatus {
    Scheduled,
    Completed,
    Declined,
    Invited,
    Confirmed,
    #[serde(rename = "Walk In")]
    WalkIn,
}

impl SignupStatus {
    pub fn code(self) -> i64 {
        match self {
            SignupStatus::Scheduled => 1,
            SignupStatus::Completed => 2,
            SignupStatus::Declined => 3,
            SignupStatus::Invited => 4,
            SignupStatus::Confirmed => 11,
            SignupStatus::WalkIn => 15,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(SignupStatus::Scheduled),
            2 => Some(SignupStatus::Completed),
            3 => Some(SignupStatus::Declined),
            4 => Some(SignupStatus::Invited),
            11 => Some(SignupStatus::Confirmed),
            15 => Some(SignupStatus::WalkIn),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SignupStatus::Scheduled => "Scheduled",
            SignupStatus::Completed => "Completed",
            SignupStatus::Declined => "Declined",
            SignupStatus::Invited => "Invited",
            SignupStatus::Confirmed => "Confirmed",
            SignupStatus::WalkIn => "Walk In",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(SignupStatus::Scheduled.code(), 1);
        assert_eq!(SignupStatus::Completed.code(), 2);
        assert_eq!(SignupStatus::Declined.code(), 3);
        assert_eq!(SignupStatus::Invited.code(), 4);
        assert_eq!(SignupStatus::Confirmed.code(), 11);
        assert_eq!(SignupStatus::WalkIn.code(), 15);
    }

    #[test]
    fn status_code_roundtrip() {
        for status in [
            SignupStatus::Scheduled,
            SignupStatus::Completed,
            SignupStatus::Declined,
            SignupStatus::Invited,
            SignupStatus::Confirmed,
            SignupStatus::WalkIn,
        ] {
            assert_eq!(SignupStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(SignupStatus::from_code(99), None);
    }

    #[test]
    fn walk_in_serializes_with_space() {
        let json = serde_json::to_string(&SignupStatus::WalkIn).unwrap();
        assert_eq!(json, "\"Walk In\"");

        let parsed: SignupStatus = serde_json::from_str("\"Walk In\"").unwrap();
        assert_eq!(parsed, SignupStatus::WalkIn);
    }

    #[test]
    fn event_tree_deserializes_with_defaults() {
        let tree: EventTree = serde_json::from_str(
            r#"{"external_id": 42, "name": "Canvass Kickoff"}"#,
        )
        .unwrap();
        assert_eq!(tree.external_id, 42);
        assert!(tree.shifts.is_empty());
        assert!(tree.locations.is_empty());
        assert!(tree.signups.is_empty());
    }
}
