//! Tree reconciliation integration tests: routing, idempotence, fallback
//! resolution, positional pairing, and per-signup failure isolation.

use std::sync::Arc;

use tokio::sync::Mutex;

use rostersync::model::{EventTree, LocationAttrs, PersonAttrs, ShiftAttrs, SignupStatus, SignupTree};
use rostersync::{Reconciler, SharedStore, Store, SyncError, WriteScheduler};

fn setup() -> (SharedStore, Reconciler) {
    let store: SharedStore = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
    let reconciler = Reconciler::new(store.clone(), WriteScheduler::new());
    (store, reconciler)
}

fn person(external_id: i64) -> PersonAttrs {
    PersonAttrs {
        external_id,
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        email: Some("ada@example.com".to_string()),
        phone: Some("555-0100".to_string()),
    }
}

fn signup(external_id: i64) -> SignupTree {
    SignupTree {
        external_id,
        status: SignupStatus::Scheduled,
        shift_external_id: None,
        location_external_id: None,
        person: person(external_id * 10),
    }
}

fn shift(external_id: i64, name: &str) -> ShiftAttrs {
    ShiftAttrs {
        external_id,
        name: Some(name.to_string()),
        start_time: None,
        end_time: None,
    }
}

fn location(external_id: i64) -> LocationAttrs {
    LocationAttrs {
        external_id,
        name: Some("Field Office".to_string()),
        address_line1: Some("1 Main St".to_string()),
        city: Some("Springfield".to_string()),
        state: Some("IL".to_string()),
        zip: Some("62701".to_string()),
    }
}

/// The tree from the canonical scenario: event 42 with one shift, one
/// location, and one signup carrying a person.
fn tree_42() -> EventTree {
    EventTree {
        external_id: 42,
        name: "Canvass Kickoff".to_string(),
        description: None,
        start_date: None,
        end_date: None,
        shifts: vec![shift(420, "Morning")],
        locations: vec![location(4200)],
        signups: vec![signup(7)],
    }
}

#[tokio::test]
async fn unseen_external_id_takes_create_branch() {
    let (store, reconciler) = setup();
    let outcome = reconciler.reconcile(&tree_42()).await.unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.event.external_id, 42);
    assert_eq!(outcome.signups.len(), 1);
    assert!(outcome.failures.is_empty());

    // The signup is wired to the event and the fallback shift/location.
    let store = store.lock().await;
    let shift = store.event_shifts(outcome.event.id).unwrap()[0].clone();
    let location = store.event_location(outcome.event.id).unwrap().unwrap();
    assert_eq!(outcome.signups[0].event_id, outcome.event.id);
    assert_eq!(outcome.signups[0].shift_id, shift.id);
    assert_eq!(outcome.signups[0].location_id, location.id);
}

#[tokio::test]
async fn known_external_id_takes_update_branch() {
    let (_store, reconciler) = setup();
    reconciler.reconcile(&tree_42()).await.unwrap();

    let outcome = reconciler.reconcile(&tree_42()).await.unwrap();
    assert!(!outcome.created);
}

#[tokio::test]
async fn resubmitting_unchanged_tree_creates_nothing() {
    let (store, reconciler) = setup();
    reconciler.reconcile(&tree_42()).await.unwrap();

    let (events, shifts, signups, people) = {
        let store = store.lock().await;
        (
            store.count_events().unwrap(),
            store.count_shifts().unwrap(),
            store.count_signups().unwrap(),
            store.count_people().unwrap(),
        )
    };

    let outcome = reconciler.reconcile(&tree_42()).await.unwrap();
    assert!(outcome.failures.is_empty());

    let store = store.lock().await;
    assert_eq!(store.count_events().unwrap(), events);
    assert_eq!(store.count_shifts().unwrap(), shifts);
    assert_eq!(store.count_signups().unwrap(), signups);
    assert_eq!(store.count_people().unwrap(), people);
}

#[tokio::test]
async fn status_change_updates_one_signup_and_creates_none() {
    let (store, reconciler) = setup();
    reconciler.reconcile(&tree_42()).await.unwrap();

    let mut tree = tree_42();
    tree.signups[0].status = SignupStatus::Confirmed;
    let outcome = reconciler.reconcile(&tree).await.unwrap();

    assert!(!outcome.created);
    assert_eq!(outcome.signups.len(), 1);
    assert_eq!(outcome.signups[0].status, SignupStatus::Confirmed);

    let store = store.lock().await;
    assert_eq!(store.count_signups().unwrap(), 1);
    assert_eq!(
        store.find_signup(7).unwrap().unwrap().status,
        SignupStatus::Confirmed
    );
}

#[tokio::test]
async fn explicit_shift_reference_wins_over_fallback() {
    let (store, reconciler) = setup();
    let mut tree = tree_42();
    tree.shifts = vec![shift(420, "Morning"), shift(421, "Afternoon")];
    tree.signups[0].shift_external_id = Some(421);

    let outcome = reconciler.reconcile(&tree).await.unwrap();
    assert!(outcome.failures.is_empty());

    let store = store.lock().await;
    let afternoon = store.find_shift(421).unwrap().unwrap();
    assert_eq!(outcome.signups[0].shift_id, afternoon.id);
}

#[tokio::test]
async fn unknown_shift_reference_falls_back_to_first_shift() {
    let (store, reconciler) = setup();
    let mut tree = tree_42();
    tree.signups[0].shift_external_id = Some(999);

    let outcome = reconciler.reconcile(&tree).await.unwrap();
    assert!(outcome.failures.is_empty());

    let store = store.lock().await;
    let first = store.event_shifts(outcome.event.id).unwrap()[0].clone();
    assert_eq!(outcome.signups[0].shift_id, first.id);
}

#[tokio::test]
async fn signup_without_resolvable_shift_fails_and_siblings_continue() {
    let (store, reconciler) = setup();
    let mut tree = tree_42();
    tree.shifts.clear(); // no shifts at all: every signup create must fail
    tree.signups = vec![signup(7), signup(8)];

    let outcome = reconciler.reconcile(&tree).await.unwrap();

    // The event itself was still created; both signups failed structurally
    // without aborting each other or the tree.
    assert!(outcome.created);
    assert_eq!(outcome.signups.len(), 0);
    assert_eq!(outcome.failures.len(), 2);
    for failure in &outcome.failures {
        assert!(matches!(
            &failure.error,
            SyncError::MissingShift {
                event_external_id: 42
            }
        ));
    }

    let store = store.lock().await;
    assert_eq!(store.count_events().unwrap(), 1);
    assert_eq!(store.count_signups().unwrap(), 0);
}

#[tokio::test]
async fn update_branch_creates_signup_with_unseen_external_id() {
    let (store, reconciler) = setup();
    reconciler.reconcile(&tree_42()).await.unwrap();

    let mut tree = tree_42();
    tree.signups.push(signup(8));
    let outcome = reconciler.reconcile(&tree).await.unwrap();

    assert!(!outcome.created);
    assert_eq!(outcome.signups.len(), 2);

    let store = store.lock().await;
    assert_eq!(store.count_signups().unwrap(), 2);
    assert!(store.find_signup(8).unwrap().is_some());
}

#[tokio::test]
async fn update_branch_updates_owned_person() {
    let (store, reconciler) = setup();
    reconciler.reconcile(&tree_42()).await.unwrap();

    let mut tree = tree_42();
    tree.signups[0].person.email = Some("ada@newdomain.example.com".to_string());
    reconciler.reconcile(&tree).await.unwrap();

    let store = store.lock().await;
    let signup = store.find_signup(7).unwrap().unwrap();
    let person = store.signup_person(signup.id).unwrap().unwrap();
    assert_eq!(
        person.email.as_deref(),
        Some("ada@newdomain.example.com")
    );
}

#[tokio::test]
async fn extra_inbound_shifts_are_ignored() {
    let (store, reconciler) = setup();
    reconciler.reconcile(&tree_42()).await.unwrap();

    // One existing shift, three inbound: shift 0 pairs positionally, the
    // extra two are dropped.
    let mut tree = tree_42();
    tree.shifts = vec![
        shift(420, "Morning (revised)"),
        shift(901, "Phantom 1"),
        shift(902, "Phantom 2"),
    ];
    let outcome = reconciler.reconcile(&tree).await.unwrap();

    let store = store.lock().await;
    let shifts = store.event_shifts(outcome.event.id).unwrap();
    assert_eq!(shifts.len(), 1);
    assert_eq!(shifts[0].name.as_deref(), Some("Morning (revised)"));
    assert!(store.find_shift(901).unwrap().is_none());
}

#[tokio::test]
async fn extra_existing_shifts_are_left_untouched() {
    let (store, reconciler) = setup();
    let mut tree = tree_42();
    tree.shifts = vec![shift(420, "Morning"), shift(421, "Afternoon")];
    reconciler.reconcile(&tree).await.unwrap();

    // Two existing shifts, one inbound: only position 0 updates.
    let mut tree = tree_42();
    tree.shifts = vec![shift(420, "Morning (revised)")];
    let outcome = reconciler.reconcile(&tree).await.unwrap();

    let store = store.lock().await;
    let shifts = store.event_shifts(outcome.event.id).unwrap();
    assert_eq!(shifts.len(), 2);
    assert_eq!(shifts[0].name.as_deref(), Some("Morning (revised)"));
    assert_eq!(shifts[1].name.as_deref(), Some("Afternoon"));
}

#[tokio::test]
async fn update_branch_updates_location_in_place() {
    let (store, reconciler) = setup();
    reconciler.reconcile(&tree_42()).await.unwrap();
    let before = {
        let store = store.lock().await;
        let event = store.find_event(42).unwrap().unwrap();
        store.event_location(event.id).unwrap().unwrap()
    };

    let mut tree = tree_42();
    tree.locations[0].address_line1 = Some("2 Oak Ave".to_string());
    reconciler.reconcile(&tree).await.unwrap();

    let store = store.lock().await;
    let event = store.find_event(42).unwrap().unwrap();
    let after = store.event_location(event.id).unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.address_line1.as_deref(), Some("2 Oak Ave"));
}

#[tokio::test]
async fn update_branch_attaches_location_first_seen_later() {
    let (store, reconciler) = setup();

    // First sighting carries no location; the event materializes without one.
    let mut bare = tree_42();
    bare.locations.clear();
    bare.signups.clear();
    let outcome = reconciler.reconcile(&bare).await.unwrap();
    {
        let store = store.lock().await;
        assert!(store.event_location(outcome.event.id).unwrap().is_none());
    }

    // The next pass carries the location: it attaches, and the signup
    // create can now resolve it.
    let outcome = reconciler.reconcile(&tree_42()).await.unwrap();
    assert!(!outcome.created);
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.signups.len(), 1);

    let store = store.lock().await;
    let location = store.event_location(outcome.event.id).unwrap().unwrap();
    assert_eq!(location.external_id, 4200);
    assert_eq!(outcome.signups[0].location_id, location.id);
}

#[tokio::test]
async fn reconcile_many_isolates_tree_failures() {
    let (_store, reconciler) = setup();

    let mut broken = tree_42();
    broken.external_id = 43;
    broken.shifts.clear();
    broken.locations.clear();

    let results = reconciler.reconcile_many(&[tree_42(), broken]).await;
    assert_eq!(results.len(), 2);

    let healthy = results[0].as_ref().unwrap();
    assert!(healthy.created);
    assert!(healthy.failures.is_empty());

    // Tree 43 still materializes its event; its signup fails structurally.
    let degraded = results[1].as_ref().unwrap();
    assert!(degraded.created);
    assert_eq!(degraded.failures.len(), 1);
}
