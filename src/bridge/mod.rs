//! External sync bridge — fans a reconciled tree out to the downstream REST
//! system.
//!
//! The HTTP surface is the `DownstreamApi` trait: one create/update method
//! per resource, each create returning the remote-assigned id under its
//! resource-specific field name. `DownstreamClient` is the real
//! implementation; tests substitute their own. `SyncBridge` walks a
//! `ReconcileOutcome`, creates what has no remote id yet, updates what
//! does, and persists the returned remote ids back to the store through the
//! write scheduler.
//!
//! Failure policy: a non-2xx response or network failure surfaces as a typed
//! error. The event's own failure aborts the tree; a person or signup
//! failure skips that signup and the rest of the tree continues. No retries.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::DownstreamConfig;
use crate::reconcile::ReconcileOutcome;
use crate::scheduler::{WriteScheduler, PRIORITY_EVENT, PRIORITY_SIGNUP};
use crate::store::{
    EventRecord, LocationRecord, PersonRecord, SharedStore, ShiftRecord, SignupRecord,
};
use crate::types::{Result, SyncError};

#[derive(Debug, Deserialize)]
struct EventCreateResponse {
    #[serde(rename = "eventId")]
    event_id: i64,
}

#[derive(Debug, Deserialize)]
struct LocationCreateResponse {
    #[serde(rename = "locationId")]
    location_id: i64,
}

#[derive(Debug, Deserialize)]
struct PersonCreateResponse {
    #[serde(rename = "vanId")]
    van_id: i64,
}

#[derive(Debug, Deserialize)]
struct ShiftCreateResponse {
    #[serde(rename = "eventShiftId")]
    event_shift_id: i64,
}

#[derive(Debug, Deserialize)]
struct SignupCreateResponse {
    #[serde(rename = "eventSignupId")]
    event_signup_id: i64,
}

/// Downstream API surface, one create/update method per resource. Each
/// create returns the remote-assigned id.
#[async_trait]
pub trait DownstreamApi: Send + Sync {
    async fn create_event(&self, event: &EventRecord) -> Result<i64>;
    async fn create_shift(&self, event_remote_id: i64, shift: &ShiftRecord) -> Result<i64>;
    async fn create_location(&self, location: &LocationRecord) -> Result<i64>;
    async fn create_person(&self, person: &PersonRecord) -> Result<i64>;
    async fn create_signup(
        &self,
        signup: &SignupRecord,
        event_remote_id: i64,
        shift_remote_id: i64,
        location_remote_id: i64,
        person_remote_id: i64,
    ) -> Result<i64>;
    async fn update_event(&self, remote_id: i64, event: &EventRecord) -> Result<()>;
    async fn update_person(&self, remote_id: i64, person: &PersonRecord) -> Result<()>;
    async fn update_signup(&self, remote_id: i64, signup: &SignupRecord) -> Result<()>;
}

/// Authenticated client for the downstream REST API.
pub struct DownstreamClient {
    http: reqwest::Client,
    base_url: String,
    application_name: String,
    api_key: String,
}

impl DownstreamClient {
    pub fn new(config: &DownstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Downstream(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            application_name: config.application_name.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn create_resource<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.application_name, Some(&self.api_key))
            .json(payload)
            .send()
            .await
            .map_err(|e| SyncError::Downstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::DownstreamStatus {
                status: response.status().as_u16(),
                endpoint: endpoint.to_string(),
            });
        }

        debug!(endpoint, "downstream create succeeded");
        response
            .json()
            .await
            .map_err(|e| SyncError::Downstream(e.to_string()))
    }

    /// Update calls return no payload.
    async fn update_resource(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .http
            .request(method, &url)
            .basic_auth(&self.application_name, Some(&self.api_key))
            .json(payload)
            .send()
            .await
            .map_err(|e| SyncError::Downstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::DownstreamStatus {
                status: response.status().as_u16(),
                endpoint: endpoint.to_string(),
            });
        }

        debug!(endpoint, "downstream update succeeded");
        Ok(())
    }
}

#[async_trait]
impl DownstreamApi for DownstreamClient {
    async fn create_event(&self, event: &EventRecord) -> Result<i64> {
        let response: EventCreateResponse = self
            .create_resource(
                "/events",
                &json!({
                    "name": event.name,
                    "description": event.description,
                    "startDate": event.start_date,
                    "endDate": event.end_date,
                }),
            )
            .await?;
        Ok(response.event_id)
    }

    /// Shift creation nests under its parent event's remote id.
    async fn create_shift(&self, event_remote_id: i64, shift: &ShiftRecord) -> Result<i64> {
        let response: ShiftCreateResponse = self
            .create_resource(
                &format!("/events/{event_remote_id}/shifts"),
                &json!({
                    "name": shift.name,
                    "startTime": shift.start_time,
                    "endTime": shift.end_time,
                }),
            )
            .await?;
        Ok(response.event_shift_id)
    }

    /// Idempotent at the downstream boundary.
    async fn create_location(&self, location: &LocationRecord) -> Result<i64> {
        let response: LocationCreateResponse = self
            .create_resource(
                "/locations/findOrCreate",
                &json!({
                    "name": location.name,
                    "addressLine1": location.address_line1,
                    "city": location.city,
                    "state": location.state,
                    "zip": location.zip,
                }),
            )
            .await?;
        Ok(response.location_id)
    }

    /// Idempotent at the downstream boundary.
    async fn create_person(&self, person: &PersonRecord) -> Result<i64> {
        let response: PersonCreateResponse = self
            .create_resource(
                "/people/findOrCreate",
                &json!({
                    "firstName": person.first_name,
                    "lastName": person.last_name,
                    "email": person.email,
                    "phone": person.phone,
                }),
            )
            .await?;
        Ok(response.van_id)
    }

    async fn create_signup(
        &self,
        signup: &SignupRecord,
        event_remote_id: i64,
        shift_remote_id: i64,
        location_remote_id: i64,
        person_remote_id: i64,
    ) -> Result<i64> {
        let response: SignupCreateResponse = self
            .create_resource(
                "/signups",
                &json!({
                    "eventId": event_remote_id,
                    "shiftId": shift_remote_id,
                    "locationId": location_remote_id,
                    "personId": person_remote_id,
                    "statusId": signup.status.code(),
                }),
            )
            .await?;
        Ok(response.event_signup_id)
    }

    async fn update_event(&self, remote_id: i64, event: &EventRecord) -> Result<()> {
        self.update_resource(
            reqwest::Method::PUT,
            &format!("/events/{remote_id}"),
            &json!({
                "name": event.name,
                "description": event.description,
                "startDate": event.start_date,
                "endDate": event.end_date,
            }),
        )
        .await
    }

    // Person updates go over POST; the downstream API has no PUT for people.
    async fn update_person(&self, remote_id: i64, person: &PersonRecord) -> Result<()> {
        self.update_resource(
            reqwest::Method::POST,
            &format!("/people/{remote_id}"),
            &json!({
                "firstName": person.first_name,
                "lastName": person.last_name,
                "email": person.email,
                "phone": person.phone,
            }),
        )
        .await
    }

    async fn update_signup(&self, remote_id: i64, signup: &SignupRecord) -> Result<()> {
        self.update_resource(
            reqwest::Method::PUT,
            &format!("/signups/{remote_id}"),
            &json!({ "statusId": signup.status.code() }),
        )
        .await
    }
}

/// Per-tree summary of the downstream fan-out.
#[derive(Debug)]
pub struct BridgeReport {
    pub event_remote_id: i64,
    pub signups_synced: usize,
    pub signups_failed: usize,
}

pub struct SyncBridge<C: DownstreamApi = DownstreamClient> {
    client: C,
    store: SharedStore,
    scheduler: WriteScheduler,
}

impl<C: DownstreamApi> SyncBridge<C> {
    pub fn new(client: C, store: SharedStore, scheduler: WriteScheduler) -> Self {
        Self {
            client,
            store,
            scheduler,
        }
    }

    /// Fan one reconciled tree out downstream. The event's own failure
    /// aborts the tree; per-signup failures are logged and skipped.
    pub async fn sync_outcome(&self, outcome: &ReconcileOutcome) -> Result<BridgeReport> {
        let event = &outcome.event;

        let event_remote_id = match event.remote_id {
            Some(remote_id) => {
                self.client.update_event(remote_id, event).await?;
                remote_id
            }
            None => {
                let remote_id = self.client.create_event(event).await?;
                let event_id = event.id;
                let store = self.store.clone();
                self.scheduler
                    .schedule(PRIORITY_EVENT, move || async move {
                        store.lock().await.set_event_remote_id(event_id, remote_id)
                    })
                    .await?;
                remote_id
            }
        };

        self.sync_location(event).await?;
        self.sync_shifts(event, event_remote_id).await?;

        let mut synced = 0;
        let mut failed = 0;
        for signup in &outcome.signups {
            match self.sync_signup(event_remote_id, signup).await {
                Ok(()) => synced += 1,
                Err(error) => {
                    warn!(
                        external_id = signup.external_id,
                        error = %error,
                        "downstream signup sync failed, continuing"
                    );
                    failed += 1;
                }
            }
        }

        info!(
            external_id = event.external_id,
            event_remote_id,
            signups_synced = synced,
            signups_failed = failed,
            "tree synced downstream"
        );
        Ok(BridgeReport {
            event_remote_id,
            signups_synced: synced,
            signups_failed: failed,
        })
    }

    async fn sync_location(&self, event: &EventRecord) -> Result<()> {
        let location = self.store.lock().await.event_location(event.id)?;
        if let Some(location) = location {
            if location.remote_id.is_none() {
                let remote_id = self.client.create_location(&location).await?;
                let location_id = location.id;
                let store = self.store.clone();
                self.scheduler
                    .schedule(PRIORITY_EVENT, move || async move {
                        store
                            .lock()
                            .await
                            .set_location_remote_id(location_id, remote_id)
                    })
                    .await?;
            }
        }
        Ok(())
    }

    async fn sync_shifts(&self, event: &EventRecord, event_remote_id: i64) -> Result<()> {
        let shifts = self.store.lock().await.event_shifts(event.id)?;
        for shift in shifts {
            if shift.remote_id.is_none() {
                let remote_id = self.client.create_shift(event_remote_id, &shift).await?;
                let shift_id = shift.id;
                let store = self.store.clone();
                self.scheduler
                    .schedule(PRIORITY_EVENT, move || async move {
                        store.lock().await.set_shift_remote_id(shift_id, remote_id)
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// Person first (a new signup needs its remote person id), then the
    /// signup itself.
    async fn sync_signup(&self, event_remote_id: i64, signup: &SignupRecord) -> Result<()> {
        let (person, shift_remote, location_remote) = {
            let store = self.store.lock().await;
            let person = store
                .signup_person(signup.id)?
                .ok_or(SyncError::MissingPerson {
                    signup_external_id: signup.external_id,
                })?;
            let shift_remote = store
                .event_shifts(signup.event_id)?
                .into_iter()
                .find(|s| s.id == signup.shift_id)
                .and_then(|s| s.remote_id);
            let location_remote = store
                .event_location(signup.event_id)?
                .and_then(|l| l.remote_id);
            (person, shift_remote, location_remote)
        };

        let person_remote_id = match person.remote_id {
            Some(remote_id) => {
                self.client.update_person(remote_id, &person).await?;
                remote_id
            }
            None => {
                let remote_id = self.client.create_person(&person).await?;
                let person_id = person.id;
                let store = self.store.clone();
                self.scheduler
                    .schedule(PRIORITY_SIGNUP, move || async move {
                        store.lock().await.set_person_remote_id(person_id, remote_id)
                    })
                    .await?;
                remote_id
            }
        };

        match signup.remote_id {
            Some(remote_id) => self.client.update_signup(remote_id, signup).await,
            None => {
                let shift_remote_id = shift_remote.ok_or_else(|| {
                    SyncError::Downstream(format!(
                        "signup {} references a shift with no remote id",
                        signup.external_id
                    ))
                })?;
                let location_remote_id = location_remote.ok_or_else(|| {
                    SyncError::Downstream(format!(
                        "signup {} references a location with no remote id",
                        signup.external_id
                    ))
                })?;
                let remote_id = self
                    .client
                    .create_signup(
                        signup,
                        event_remote_id,
                        shift_remote_id,
                        location_remote_id,
                        person_remote_id,
                    )
                    .await?;
                let signup_id = signup.id;
                let store = self.store.clone();
                self.scheduler
                    .schedule(PRIORITY_SIGNUP, move || async move {
                        store.lock().await.set_signup_remote_id(signup_id, remote_id)
                    })
                    .await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_responses_parse_resource_specific_id_fields() {
        let event: EventCreateResponse = serde_json::from_str(r#"{"eventId": 101}"#).unwrap();
        assert_eq!(event.event_id, 101);

        let location: LocationCreateResponse =
            serde_json::from_str(r#"{"locationId": 202}"#).unwrap();
        assert_eq!(location.location_id, 202);

        let person: PersonCreateResponse = serde_json::from_str(r#"{"vanId": 303}"#).unwrap();
        assert_eq!(person.van_id, 303);

        let shift: ShiftCreateResponse =
            serde_json::from_str(r#"{"eventShiftId": 404}"#).unwrap();
        assert_eq!(shift.event_shift_id, 404);

        let signup: SignupCreateResponse =
            serde_json::from_str(r#"{"eventSignupId": 505}"#).unwrap();
        assert_eq!(signup.event_signup_id, 505);
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = DownstreamClient::new(&DownstreamConfig {
            base_url: "https://downstream.example.com/v4/".to_string(),
            application_name: "rostersync".to_string(),
            api_key: "key".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(client.base_url, "https://downstream.example.com/v4");
    }
}
