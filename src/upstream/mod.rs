//! Upstream event tree fetcher.
//!
//! Read-only client for the upstream system of record. Events arrive as a
//! paginated collection with nested shifts and locations; each signup is a
//! resource URL that must be fetched and joined with its person and phone
//! list before the tree is complete. Pure read access, never writes.

use std::time::Duration;

use futures::future::try_join_all;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::UpstreamConfig;
use crate::model::{EventTree, LocationAttrs, PersonAttrs, ShiftAttrs, SignupStatus, SignupTree};
use crate::types::{Result, SyncError};

#[derive(Debug, Deserialize)]
struct EventPage {
    objects: Vec<RawEvent>,
    #[serde(default)]
    meta: PageMeta,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: i64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    start_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    end_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    shifts: Vec<RawShift>,
    #[serde(default)]
    locations: Vec<RawLocation>,
    /// Signup resource URLs, fetched individually.
    #[serde(default)]
    signups: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawShift {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    start_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    end_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address_line1: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    zip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSignup {
    id: i64,
    status: RawStatus,
    #[serde(default)]
    shift: Option<i64>,
    #[serde(default)]
    location: Option<i64>,
    /// Person resource URL.
    person: String,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    name: SignupStatus,
}

#[derive(Debug, Deserialize)]
struct RawPerson {
    id: i64,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    /// Phone resource URLs; the first resolved number is kept.
    #[serde(default)]
    phones: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawPhone {
    number: String,
}

/// Read-only upstream client.
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    campaign_endpoint: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Upstream(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            campaign_endpoint: config.campaign_endpoint.clone(),
        })
    }

    /// Fetch every event tree in the configured campaign, following
    /// pagination links.
    pub async fn fetch_event_trees(&self) -> Result<Vec<EventTree>> {
        let mut url = self.absolutize(&self.campaign_endpoint);
        let mut trees = Vec::new();

        loop {
            let page: EventPage = self.get_json(&url).await?;
            debug!(url, events = page.objects.len(), "fetched event page");

            for raw in page.objects {
                trees.push(self.assemble(raw).await?);
            }

            match page.meta.next {
                Some(next) => url = self.absolutize(&next),
                None => break,
            }
        }

        info!(events = trees.len(), "fetched upstream event trees");
        Ok(trees)
    }

    /// Fetch a single event tree by its upstream id.
    pub async fn fetch_event_tree(&self, event_id: i64) -> Result<EventTree> {
        let url = format!("{}/events/{}", self.base_url, event_id);
        let raw: RawEvent = self.get_json(&url).await?;
        self.assemble(raw).await
    }

    /// Join an event with its signups, their people, and their phones.
    async fn assemble(&self, raw: RawEvent) -> Result<EventTree> {
        let signups = try_join_all(
            raw.signups
                .iter()
                .map(|signup_url| self.fetch_signup(signup_url)),
        )
        .await?;

        Ok(EventTree {
            external_id: raw.id,
            name: raw.name,
            description: raw.description,
            start_date: raw.start_date,
            end_date: raw.end_date,
            shifts: raw
                .shifts
                .into_iter()
                .map(|s| ShiftAttrs {
                    external_id: s.id,
                    name: s.name,
                    start_time: s.start_time,
                    end_time: s.end_time,
                })
                .collect(),
            locations: raw
                .locations
                .into_iter()
                .map(|l| LocationAttrs {
                    external_id: l.id,
                    name: l.name,
                    address_line1: l.address_line1,
                    city: l.city,
                    state: l.state,
                    zip: l.zip,
                })
                .collect(),
            signups,
        })
    }

    async fn fetch_signup(&self, signup_url: &str) -> Result<SignupTree> {
        let raw: RawSignup = self.get_json(&self.absolutize(signup_url)).await?;
        let person = self.fetch_person(&raw.person).await?;
        Ok(SignupTree {
            external_id: raw.id,
            status: raw.status.name,
            shift_external_id: raw.shift,
            location_external_id: raw.location,
            person,
        })
    }

    async fn fetch_person(&self, person_url: &str) -> Result<PersonAttrs> {
        let raw: RawPerson = self.get_json(&self.absolutize(person_url)).await?;
        let phone = match raw.phones.first() {
            Some(phone_url) => {
                let raw_phone: RawPhone = self.get_json(&self.absolutize(phone_url)).await?;
                Some(raw_phone.number)
            }
            None => None,
        };
        Ok(PersonAttrs {
            external_id: raw.id,
            first_name: raw.first_name,
            last_name: raw.last_name,
            email: raw.email,
            phone,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| SyncError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::UpstreamStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::Upstream(e.to_string()))
    }

    fn absolutize(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url, url)
        }
    }
}
