use crate::config::PortalConfig;
use crate::constants::{
    CULTURE_PORTAL_API, LOCATION_UNSPECIFIED, NO_DETAILS, PRICE_UNSPECIFIED, TIME_UNSPECIFIED,
};
use crate::error::{Result, SyncError};
use crate::normalize::{event_id, format_yyyymmdd, map_category, parse_period, split_paragraphs};
use crate::types::{CanonicalEvent, EventSource, EventSourceApi, RawEventData};
use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Primary source: the national culture portal open API. Rich listings
/// (genre, period, venue, price, poster) plus a detail endpoint carrying
/// the long-form synopsis and visitor notices.
pub struct CulturePortalApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CulturePortalApi {
    /// The portal is the mandatory source: a missing key is a
    /// configuration error that fails the run up front.
    pub fn new(config: &PortalConfig) -> Result<Self> {
        let api_key = std::env::var("CULTURE_PORTAL_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                SyncError::Config("CULTURE_PORTAL_API_KEY is not set".to_string())
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn text_or<'a>(raw: &'a RawEventData, field: &str, fallback: &'a str) -> &'a str {
        match raw[field].as_str() {
            Some(s) if !s.trim().is_empty() => s,
            _ => fallback,
        }
    }

    fn item_id(raw: &RawEventData) -> Result<String> {
        if let Some(id) = raw["eventId"].as_str() {
            return Ok(id.to_string());
        }
        if let Some(id) = raw["eventId"].as_i64() {
            return Ok(id.to_string());
        }
        Err(SyncError::MissingField("eventId not found".into()))
    }
}

#[async_trait::async_trait]
impl EventSourceApi for CulturePortalApi {
    fn source_name(&self) -> &'static str {
        CULTURE_PORTAL_API
    }

    fn source(&self) -> EventSource {
        EventSource::CulturePortal
    }

    #[instrument(skip(self))]
    async fn list_events(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<RawEventData>> {
        let url = format!("{}/period", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("serviceKey", self.api_key.clone()),
                ("from", format_yyyymmdd(start_date)),
                ("to", format_yyyymmdd(end_date)),
                ("cPage", page.to_string()),
                ("rows", page_size.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Api {
                message: format!("portal listing failed with status {}", status.as_u16()),
            });
        }

        let data: Value = response.json().await?;
        // The portal nests rows under "events" but has been seen flat too
        let rows = data["events"]["row"]
            .as_array()
            .or_else(|| data["row"].as_array())
            .ok_or_else(|| SyncError::MissingField("events.row not found".into()))?;

        info!(
            "Successfully fetched {} events from the culture portal",
            rows.len()
        );
        Ok(rows.to_vec())
    }

    #[instrument(skip(self))]
    async fn get_event_detail(&self, source_ref: &str) -> Result<Option<RawEventData>> {
        let url = format!("{}/detail/{}", self.base_url, source_ref);
        let response = self
            .client
            .get(&url)
            .query(&[("serviceKey", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            debug!("Portal has no detail for {}", source_ref);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SyncError::Api {
                message: format!("portal detail failed with status {}", status.as_u16()),
            });
        }

        let data: Value = response.json().await?;
        let detail = data["event"].clone();
        if detail.is_null() {
            return Ok(None);
        }
        Ok(Some(detail))
    }

    fn to_canonical(&self, raw: &RawEventData) -> Result<CanonicalEvent> {
        let title = raw["title"]
            .as_str()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::MissingField("title not found".into()))?;
        let source_ref = Self::item_id(raw)?;

        let (start, end) = parse_period(raw["period"].as_str().unwrap_or(""));
        let start_date = format_yyyymmdd(start);
        let end_date = format_yyyymmdd(end);

        Ok(CanonicalEvent {
            id: event_id(self.source(), title, &start_date),
            source: self.source(),
            source_ref,
            category: map_category(raw["genre"].as_str().unwrap_or("")).to_string(),
            title: title.to_string(),
            description: Self::text_or(raw, "summary", "").to_string(),
            start_date,
            end_date,
            time: Self::text_or(raw, "time", TIME_UNSPECIFIED).to_string(),
            price: Self::text_or(raw, "price", PRICE_UNSPECIFIED).to_string(),
            location: Self::text_or(raw, "place", LOCATION_UNSPECIFIED).to_string(),
            image_url: Self::text_or(raw, "thumbnail", "").to_string(),
            long_description: vec![NO_DETAILS.to_string()],
            tips: Vec::new(),
        })
    }

    fn apply_detail(&self, event: &mut CanonicalEvent, detail: &RawEventData) {
        if let Some(synopsis) = detail["synopsis"].as_str() {
            if !synopsis.trim().is_empty() {
                event.long_description = split_paragraphs(synopsis);
            }
        }
        if let Some(notices) = detail["notices"].as_array() {
            event.tips = notices
                .iter()
                .filter_map(|n| n.as_str())
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
        }
        // Detail values are authoritative where the listing row was sparse
        if event.time == TIME_UNSPECIFIED {
            if let Some(time) = detail["time"].as_str().filter(|t| !t.trim().is_empty()) {
                event.time = time.to_string();
            }
        }
        if event.price == PRICE_UNSPECIFIED {
            if let Some(price) = detail["price"].as_str().filter(|p| !p.trim().is_empty()) {
                event.price = price.to_string();
            }
        }
        if event.image_url.is_empty() {
            if let Some(poster) = detail["poster"].as_str().filter(|p| !p.trim().is_empty()) {
                event.image_url = poster.to_string();
            }
        }
    }
}
