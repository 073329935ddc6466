use crate::constants::{CULTURE_PORTAL_ID_PREFIX, TOUR_API_ID_PREFIX};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Raw event data as returned from external provider APIs
pub type RawEventData = serde_json::Value;

/// The external provider a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    CulturePortal,
    TourApi,
}

impl EventSource {
    /// Prefix prepended to generated event ids for this source
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EventSource::CulturePortal => CULTURE_PORTAL_ID_PREFIX,
            EventSource::TourApi => TOUR_API_ID_PREFIX,
        }
    }

    /// True for the source whose records carry the richer payload. Used as
    /// the dedup tie-break.
    pub fn is_primary(&self) -> bool {
        matches!(self, EventSource::CulturePortal)
    }
}

/// One real-world happening, normalized into the source-agnostic shape the
/// rest of the pipeline operates on. Dates are `YYYYMMDD` strings with
/// `start_date <= end_date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: String,
    pub source: EventSource,
    /// Provider-native item id, kept for the detail lookup
    pub source_ref: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub start_date: String,
    pub end_date: String,
    pub time: String,
    pub price: String,
    pub location: String,
    pub image_url: String,
    pub long_description: Vec<String>,
    pub tips: Vec<String>,
}

/// The textual fields of an event that get localized per language
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventFields {
    pub title: String,
    pub description: String,
    pub long_description: Vec<String>,
    pub tips: Vec<String>,
}

impl EventFields {
    pub fn of(event: &CanonicalEvent) -> Self {
        Self {
            title: event.title.clone(),
            description: event.description.clone(),
            long_description: event.long_description.clone(),
            tips: event.tips.clone(),
        }
    }
}

/// One language-specific persisted copy of a canonical event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizedEvent {
    pub id: String,
    pub language: String,
    pub source: EventSource,
    pub category: String,
    pub title: String,
    pub description: String,
    pub start_date: String,
    pub end_date: String,
    pub time: String,
    pub price: String,
    pub location: String,
    pub image_url: String,
    pub long_description: Vec<String>,
    pub tips: Vec<String>,
    /// Assigned by the document store on first write
    pub created_at: Option<DateTime<Utc>>,
    /// Refreshed by the document store on every write
    pub updated_at: Option<DateTime<Utc>>,
}

impl LocalizedEvent {
    /// Combine a canonical event with the localized text for one language
    pub fn from_canonical(event: &CanonicalEvent, fields: &EventFields, language: &str) -> Self {
        Self {
            id: event.id.clone(),
            language: language.to_string(),
            source: event.source,
            category: event.category.clone(),
            title: fields.title.clone(),
            description: fields.description.clone(),
            start_date: event.start_date.clone(),
            end_date: event.end_date.clone(),
            time: event.time.clone(),
            price: event.price.clone(),
            location: event.location.clone(),
            image_url: event.image_url.clone(),
            long_description: fields.long_description.clone(),
            tips: fields.tips.clone(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Deterministic persistence key, one document per (event, language)
    pub fn doc_key(&self) -> String {
        format!("{}-{}", self.language, self.id)
    }
}

/// Result of a complete blocking sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub events_found: usize,
    pub events_processed: usize,
}

/// Core trait that both provider adapters implement
#[async_trait::async_trait]
pub trait EventSourceApi: Send + Sync {
    /// Unique identifier for this provider
    fn source_name(&self) -> &'static str;

    /// Source tag stamped onto normalized records
    fn source(&self) -> EventSource;

    /// Fetch one bounded page of listings inside the date window. An
    /// optional source with no credentials configured returns an empty list
    /// so the rest of the batch stays alive.
    async fn list_events(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<RawEventData>>;

    /// Fetch the long-form detail payload for one listing. `None` means the
    /// provider no longer knows the item, which callers treat as a skip.
    async fn get_event_detail(&self, source_ref: &str) -> Result<Option<RawEventData>>;

    /// Map one raw listing row into the canonical representation
    fn to_canonical(&self, raw: &RawEventData) -> Result<CanonicalEvent>;

    /// Fold long-form fields from a detail payload into a canonical event
    fn apply_detail(&self, event: &mut CanonicalEvent, detail: &RawEventData);
}
