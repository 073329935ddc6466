use crate::config::TourConfig;
use crate::constants::{
    LOCATION_UNSPECIFIED, NO_DETAILS, PRICE_UNSPECIFIED, TIME_UNSPECIFIED, TOUR_API,
};
use crate::error::{Result, SyncError};
use crate::normalize::{event_id, format_yyyymmdd, map_category, parse_yyyymmdd, split_paragraphs};
use crate::types::{CanonicalEvent, EventSource, EventSourceApi, RawEventData};
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Secondary source: the tourism organization festival API. Sparse listing
/// rows (already-resolved `YYYYMMDD` dates, address, one image) and a
/// detail endpoint with a single overview blob.
pub struct TourApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TourApi {
    /// This source is optional: without `TOUR_API_KEY` the adapter stays
    /// constructible and lists nothing, keeping the batch alive on the
    /// primary source alone.
    pub fn new(config: &TourConfig) -> Result<Self> {
        let api_key = std::env::var("TOUR_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("TOUR_API_KEY is not set, the tour API source will list no events");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn items(data: &Value) -> Vec<RawEventData> {
        // items is "" instead of an object when a page is empty
        match data["response"]["body"]["items"]["item"].as_array() {
            Some(items) => items.to_vec(),
            None => Vec::new(),
        }
    }

    fn item_id(raw: &RawEventData) -> Result<String> {
        if let Some(id) = raw["contentid"].as_str() {
            return Ok(id.to_string());
        }
        if let Some(id) = raw["contentid"].as_i64() {
            return Ok(id.to_string());
        }
        Err(SyncError::MissingField("contentid not found".into()))
    }
}

#[async_trait::async_trait]
impl EventSourceApi for TourApi {
    fn source_name(&self) -> &'static str {
        TOUR_API
    }

    fn source(&self) -> EventSource {
        EventSource::TourApi
    }

    #[instrument(skip(self))]
    async fn list_events(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<RawEventData>> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                debug!("Tour API unconfigured, returning empty listing");
                return Ok(Vec::new());
            }
        };

        let url = format!("{}/searchFestival1", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("serviceKey", api_key.clone()),
                ("eventStartDate", format_yyyymmdd(start_date)),
                ("eventEndDate", format_yyyymmdd(end_date)),
                ("pageNo", page.to_string()),
                ("numOfRows", page_size.to_string()),
                ("MobileOS", "ETC".to_string()),
                ("MobileApp", "culture_sync".to_string()),
                ("_type", "json".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Api {
                message: format!("tour API listing failed with status {}", status.as_u16()),
            });
        }

        let data: Value = response.json().await?;
        let items = Self::items(&data);
        info!("Successfully fetched {} events from the tour API", items.len());
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn get_event_detail(&self, source_ref: &str) -> Result<Option<RawEventData>> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => return Ok(None),
        };

        let url = format!("{}/detailCommon1", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("serviceKey", api_key.as_str()),
                ("contentId", source_ref),
                ("overviewYN", "Y"),
                ("defaultYN", "Y"),
                ("MobileOS", "ETC"),
                ("MobileApp", "culture_sync"),
                ("_type", "json"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SyncError::Api {
                message: format!("tour API detail failed with status {}", status.as_u16()),
            });
        }

        let data: Value = response.json().await?;
        let mut items = Self::items(&data);
        if items.is_empty() {
            debug!("Tour API has no detail for {}", source_ref);
            return Ok(None);
        }
        Ok(Some(items.remove(0)))
    }

    fn to_canonical(&self, raw: &RawEventData) -> Result<CanonicalEvent> {
        let title = raw["title"]
            .as_str()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::MissingField("title not found".into()))?;
        let source_ref = Self::item_id(raw)?;

        // Dates already arrive as YYYYMMDD; missing ones degrade to today
        let today = Utc::now().date_naive();
        let start = raw["eventstartdate"]
            .as_str()
            .and_then(parse_yyyymmdd)
            .unwrap_or(today);
        let end = raw["eventenddate"]
            .as_str()
            .and_then(parse_yyyymmdd)
            .unwrap_or(start);
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let start_date = format_yyyymmdd(start);
        let end_date = format_yyyymmdd(end);

        let location = raw["addr1"]
            .as_str()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(LOCATION_UNSPECIFIED);

        Ok(CanonicalEvent {
            id: event_id(self.source(), title, &start_date),
            source: self.source(),
            source_ref,
            category: map_category(raw["cat2"].as_str().unwrap_or("")).to_string(),
            title: title.to_string(),
            description: String::new(),
            start_date,
            end_date,
            time: TIME_UNSPECIFIED.to_string(),
            price: PRICE_UNSPECIFIED.to_string(),
            location: location.to_string(),
            image_url: raw["firstimage"].as_str().unwrap_or("").to_string(),
            long_description: vec![NO_DETAILS.to_string()],
            tips: Vec::new(),
        })
    }

    fn apply_detail(&self, event: &mut CanonicalEvent, detail: &RawEventData) {
        if let Some(overview) = detail["overview"].as_str() {
            if !overview.trim().is_empty() {
                event.long_description = split_paragraphs(overview);
                if event.description.is_empty() {
                    // First paragraph doubles as the short description
                    event.description = event.long_description[0].clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> TourApi {
        TourApi {
            client: reqwest::Client::new(),
            base_url: "https://tour.test".to_string(),
            api_key: Some("test-key".to_string()),
        }
    }

    #[test]
    fn maps_a_festival_row() {
        let raw = json!({
            "contentid": "2764321",
            "title": "한강 여름 축제",
            "eventstartdate": "20240701",
            "eventenddate": "20240710",
            "addr1": "서울특별시 영등포구",
            "firstimage": "https://tour.test/img/festival.jpg",
            "cat2": "A0207"
        });

        let event = adapter().to_canonical(&raw).unwrap();
        assert_eq!(event.source, EventSource::TourApi);
        assert_eq!(event.category, "festival");
        assert_eq!(event.start_date, "20240701");
        assert_eq!(event.end_date, "20240710");
        assert!(event.id.starts_with("ta"));
    }

    #[test]
    fn reversed_dates_are_swapped() {
        let raw = json!({
            "contentid": "1",
            "title": "축제",
            "eventstartdate": "20240710",
            "eventenddate": "20240701"
        });
        let event = adapter().to_canonical(&raw).unwrap();
        assert_eq!(event.start_date, "20240701");
        assert_eq!(event.end_date, "20240710");
    }

    #[test]
    fn empty_items_payload_yields_no_rows() {
        let data = json!({"response": {"body": {"items": ""}}});
        assert!(TourApi::items(&data).is_empty());
    }

    #[test]
    fn overview_becomes_paragraphs_and_description() {
        let mut event = adapter()
            .to_canonical(&json!({"contentid": "1", "title": "등불 축제"}))
            .unwrap();
        let detail = json!({"overview": "강변을 따라 등불이 켜집니다.\n\n주말에는 공연도 열립니다."});

        adapter().apply_detail(&mut event, &detail);
        assert_eq!(event.long_description.len(), 2);
        assert_eq!(event.description, "강변을 따라 등불이 켜집니다.");
    }
}
