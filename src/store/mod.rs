//! Relational store for reconciled event trees.
//!
//! SQLite-backed persistence keyed on the upstream external id. Each entity
//! table enforces `UNIQUE(external_id)` and creates go through
//! `INSERT ... ON CONFLICT DO NOTHING` followed by a re-select, so a
//! concurrent find-then-create of the same external id cannot duplicate
//! rows.
//!
//! Writes are expected to arrive through the `WriteScheduler`; reads are
//! unguarded and may race in-flight writes. That gap is deliberate and
//! documented rather than closed here.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::model::{EventTree, LocationAttrs, PersonAttrs, ShiftAttrs, SignupStatus, SignupTree};
use crate::types::{Result, SyncError};

/// Shared handle to the store. The scheduler serializes writers; the mutex
/// only protects the connection itself.
pub type SharedStore = std::sync::Arc<tokio::sync::Mutex<Store>>;

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: i64,
    pub external_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub remote_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShiftRecord {
    pub id: i64,
    pub external_id: i64,
    pub event_id: i64,
    pub position: i64,
    pub name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub remote_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    pub id: i64,
    pub external_id: i64,
    pub event_id: i64,
    pub name: Option<String>,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub remote_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignupRecord {
    pub id: i64,
    pub external_id: i64,
    pub event_id: i64,
    pub shift_id: i64,
    pub location_id: i64,
    pub status: SignupStatus,
    pub remote_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonRecord {
    pub id: i64,
    pub external_id: i64,
    pub signup_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub remote_id: Option<i64>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                id          INTEGER PRIMARY KEY,
                external_id INTEGER NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                description TEXT,
                start_date  TEXT,
                end_date    TEXT,
                remote_id   INTEGER
            );
            CREATE TABLE IF NOT EXISTS shifts (
                id          INTEGER PRIMARY KEY,
                external_id INTEGER NOT NULL UNIQUE,
                event_id    INTEGER NOT NULL REFERENCES events(id),
                position    INTEGER NOT NULL,
                name        TEXT,
                start_time  TEXT,
                end_time    TEXT,
                remote_id   INTEGER
            );
            CREATE TABLE IF NOT EXISTS locations (
                id            INTEGER PRIMARY KEY,
                external_id   INTEGER NOT NULL UNIQUE,
                event_id      INTEGER NOT NULL REFERENCES events(id),
                name          TEXT,
                address_line1 TEXT,
                city          TEXT,
                state         TEXT,
                zip           TEXT,
                remote_id     INTEGER
            );
            CREATE TABLE IF NOT EXISTS signups (
                id          INTEGER PRIMARY KEY,
                external_id INTEGER NOT NULL UNIQUE,
                event_id    INTEGER NOT NULL REFERENCES events(id),
                shift_id    INTEGER NOT NULL REFERENCES shifts(id),
                location_id INTEGER NOT NULL REFERENCES locations(id),
                status_code INTEGER NOT NULL,
                remote_id   INTEGER
            );
            CREATE TABLE IF NOT EXISTS people (
                id          INTEGER PRIMARY KEY,
                external_id INTEGER NOT NULL UNIQUE,
                signup_id   INTEGER NOT NULL REFERENCES signups(id),
                first_name  TEXT,
                last_name   TEXT,
                email       TEXT,
                phone       TEXT,
                remote_id   INTEGER
            );",
        )?;
        Ok(Self { conn })
    }

    // ---- events ----

    pub fn find_event(&self, external_id: i64) -> Result<Option<EventRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, external_id, name, description, start_date, end_date, remote_id
             FROM events WHERE external_id = ?1",
        )?;
        let event = stmt
            .query_row(params![external_id], row_to_event)
            .optional()?;
        Ok(event)
    }

    /// Insert the event with its nested shifts and location in one
    /// transaction. A concurrent create of the same external id collapses to
    /// a no-op insert followed by the re-select.
    pub fn create_event_tree(&mut self, tree: &EventTree) -> Result<EventRecord> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO events (external_id, name, description, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(external_id) DO NOTHING",
            params![
                tree.external_id,
                tree.name,
                tree.description,
                tree.start_date,
                tree.end_date
            ],
        )?;
        let event_id: i64 = tx.query_row(
            "SELECT id FROM events WHERE external_id = ?1",
            params![tree.external_id],
            |row| row.get(0),
        )?;

        for (position, shift) in tree.shifts.iter().enumerate() {
            tx.execute(
                "INSERT INTO shifts (external_id, event_id, position, name, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(external_id) DO NOTHING",
                params![
                    shift.external_id,
                    event_id,
                    position as i64,
                    shift.name,
                    shift.start_time,
                    shift.end_time
                ],
            )?;
        }

        if let Some(location) = tree.locations.first() {
            tx.execute(
                "INSERT INTO locations (external_id, event_id, name, address_line1, city, state, zip)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(external_id) DO NOTHING",
                params![
                    location.external_id,
                    event_id,
                    location.name,
                    location.address_line1,
                    location.city,
                    location.state,
                    location.zip
                ],
            )?;
        }

        tx.commit()?;

        self.find_event(tree.external_id)?
            .ok_or(SyncError::Store(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Update the event's own attributes. The external id is never touched.
    pub fn update_event(&self, id: i64, tree: &EventTree) -> Result<EventRecord> {
        self.conn.execute(
            "UPDATE events SET name = ?2, description = ?3, start_date = ?4, end_date = ?5
             WHERE id = ?1",
            params![id, tree.name, tree.description, tree.start_date, tree.end_date],
        )?;
        self.event_by_id(id)
    }

    fn event_by_id(&self, id: i64) -> Result<EventRecord> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, external_id, name, description, start_date, end_date, remote_id
             FROM events WHERE id = ?1",
        )?;
        Ok(stmt.query_row(params![id], row_to_event)?)
    }

    pub fn set_event_remote_id(&self, id: i64, remote_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE events SET remote_id = ?2 WHERE id = ?1",
            params![id, remote_id],
        )?;
        Ok(())
    }

    pub fn count_events(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT count(*) FROM events", [], |row| row.get(0))?)
    }

    // ---- shifts ----

    /// Shifts attached to an event, in positional order.
    pub fn event_shifts(&self, event_id: i64) -> Result<Vec<ShiftRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, external_id, event_id, position, name, start_time, end_time, remote_id
             FROM shifts WHERE event_id = ?1 ORDER BY position",
        )?;
        let shifts = stmt
            .query_map(params![event_id], row_to_shift)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(shifts)
    }

    pub fn find_shift(&self, external_id: i64) -> Result<Option<ShiftRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, external_id, event_id, position, name, start_time, end_time, remote_id
             FROM shifts WHERE external_id = ?1",
        )?;
        Ok(stmt
            .query_row(params![external_id], row_to_shift)
            .optional()?)
    }

    pub fn update_shift(&self, id: i64, attrs: &ShiftAttrs) -> Result<()> {
        self.conn.execute(
            "UPDATE shifts SET name = ?2, start_time = ?3, end_time = ?4 WHERE id = ?1",
            params![id, attrs.name, attrs.start_time, attrs.end_time],
        )?;
        Ok(())
    }

    pub fn set_shift_remote_id(&self, id: i64, remote_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE shifts SET remote_id = ?2 WHERE id = ?1",
            params![id, remote_id],
        )?;
        Ok(())
    }

    pub fn count_shifts(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT count(*) FROM shifts", [], |row| row.get(0))?)
    }

    // ---- locations ----

    /// The location attached to an event (the first, if several ever exist).
    pub fn event_location(&self, event_id: i64) -> Result<Option<LocationRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, external_id, event_id, name, address_line1, city, state, zip, remote_id
             FROM locations WHERE event_id = ?1 ORDER BY id LIMIT 1",
        )?;
        Ok(stmt
            .query_row(params![event_id], row_to_location)
            .optional()?)
    }

    pub fn find_location(&self, external_id: i64) -> Result<Option<LocationRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, external_id, event_id, name, address_line1, city, state, zip, remote_id
             FROM locations WHERE external_id = ?1",
        )?;
        Ok(stmt
            .query_row(params![external_id], row_to_location)
            .optional()?)
    }

    /// Attach a location to an event that was first sighted without one.
    pub fn create_location(&self, event_id: i64, attrs: &LocationAttrs) -> Result<LocationRecord> {
        self.conn.execute(
            "INSERT INTO locations (external_id, event_id, name, address_line1, city, state, zip)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(external_id) DO NOTHING",
            params![
                attrs.external_id,
                event_id,
                attrs.name,
                attrs.address_line1,
                attrs.city,
                attrs.state,
                attrs.zip
            ],
        )?;
        self.find_location(attrs.external_id)?
            .ok_or(SyncError::Store(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn update_location(&self, id: i64, attrs: &LocationAttrs) -> Result<()> {
        self.conn.execute(
            "UPDATE locations SET name = ?2, address_line1 = ?3, city = ?4, state = ?5, zip = ?6
             WHERE id = ?1",
            params![id, attrs.name, attrs.address_line1, attrs.city, attrs.state, attrs.zip],
        )?;
        Ok(())
    }

    pub fn set_location_remote_id(&self, id: i64, remote_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE locations SET remote_id = ?2 WHERE id = ?1",
            params![id, remote_id],
        )?;
        Ok(())
    }

    // ---- signups ----

    pub fn find_signup(&self, external_id: i64) -> Result<Option<SignupRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, external_id, event_id, shift_id, location_id, status_code, remote_id
             FROM signups WHERE external_id = ?1",
        )?;
        Ok(stmt
            .query_row(params![external_id], row_to_signup)
            .optional()?)
    }

    pub fn event_signups(&self, event_id: i64) -> Result<Vec<SignupRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, external_id, event_id, shift_id, location_id, status_code, remote_id
             FROM signups WHERE event_id = ?1 ORDER BY id",
        )?;
        let signups = stmt
            .query_map(params![event_id], row_to_signup)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(signups)
    }

    /// Insert the signup and its person in one transaction.
    pub fn create_signup(
        &mut self,
        signup: &SignupTree,
        event_id: i64,
        shift_id: i64,
        location_id: i64,
    ) -> Result<SignupRecord> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO signups (external_id, event_id, shift_id, location_id, status_code)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(external_id) DO NOTHING",
            params![
                signup.external_id,
                event_id,
                shift_id,
                location_id,
                signup.status.code()
            ],
        )?;
        let signup_id: i64 = tx.query_row(
            "SELECT id FROM signups WHERE external_id = ?1",
            params![signup.external_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO people (external_id, signup_id, first_name, last_name, email, phone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(external_id) DO NOTHING",
            params![
                signup.person.external_id,
                signup_id,
                signup.person.first_name,
                signup.person.last_name,
                signup.person.email,
                signup.person.phone
            ],
        )?;

        tx.commit()?;

        self.find_signup(signup.external_id)?
            .ok_or(SyncError::Store(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn update_signup(&self, id: i64, signup: &SignupTree) -> Result<SignupRecord> {
        self.conn.execute(
            "UPDATE signups SET status_code = ?2 WHERE id = ?1",
            params![id, signup.status.code()],
        )?;
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, external_id, event_id, shift_id, location_id, status_code, remote_id
             FROM signups WHERE id = ?1",
        )?;
        Ok(stmt.query_row(params![id], row_to_signup)?)
    }

    pub fn set_signup_remote_id(&self, id: i64, remote_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE signups SET remote_id = ?2 WHERE id = ?1",
            params![id, remote_id],
        )?;
        Ok(())
    }

    pub fn count_signups(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT count(*) FROM signups", [], |row| row.get(0))?)
    }

    // ---- people ----

    pub fn signup_person(&self, signup_id: i64) -> Result<Option<PersonRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, external_id, signup_id, first_name, last_name, email, phone, remote_id
             FROM people WHERE signup_id = ?1",
        )?;
        Ok(stmt
            .query_row(params![signup_id], row_to_person)
            .optional()?)
    }

    pub fn update_person(&self, id: i64, attrs: &PersonAttrs) -> Result<()> {
        self.conn.execute(
            "UPDATE people SET first_name = ?2, last_name = ?3, email = ?4, phone = ?5
             WHERE id = ?1",
            params![id, attrs.first_name, attrs.last_name, attrs.email, attrs.phone],
        )?;
        Ok(())
    }

    pub fn set_person_remote_id(&self, id: i64, remote_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE people SET remote_id = ?2 WHERE id = ?1",
            params![id, remote_id],
        )?;
        Ok(())
    }

    pub fn count_people(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT count(*) FROM people", [], |row| row.get(0))?)
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRecord> {
    Ok(EventRecord {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        remote_id: row.get(6)?,
    })
}

fn row_to_shift(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShiftRecord> {
    Ok(ShiftRecord {
        id: row.get(0)?,
        external_id: row.get(1)?,
        event_id: row.get(2)?,
        position: row.get(3)?,
        name: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        remote_id: row.get(7)?,
    })
}

fn row_to_location(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocationRecord> {
    Ok(LocationRecord {
        id: row.get(0)?,
        external_id: row.get(1)?,
        event_id: row.get(2)?,
        name: row.get(3)?,
        address_line1: row.get(4)?,
        city: row.get(5)?,
        state: row.get(6)?,
        zip: row.get(7)?,
        remote_id: row.get(8)?,
    })
}

fn row_to_signup(row: &rusqlite::Row<'_>) -> rusqlite::Result<SignupRecord> {
    let status_code: i64 = row.get(5)?;
    let status = SignupStatus::from_code(status_code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Integer,
            format!("unknown signup status code {status_code}").into(),
        )
    })?;
    Ok(SignupRecord {
        id: row.get(0)?,
        external_id: row.get(1)?,
        event_id: row.get(2)?,
        shift_id: row.get(3)?,
        location_id: row.get(4)?,
        status,
        remote_id: row.get(6)?,
    })
}

fn row_to_person(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersonRecord> {
    Ok(PersonRecord {
        id: row.get(0)?,
        external_id: row.get(1)?,
        signup_id: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        phone: row.get(6)?,
        remote_id: row.get(7)?,
    })
}
