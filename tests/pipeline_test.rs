use async_trait::async_trait;
use culture_sync::constants::{NO_DETAILS, PRICE_UNSPECIFIED, TIME_UNSPECIFIED};
use culture_sync::enrich::MediaStore;
use culture_sync::error::{Result, SyncError};
use culture_sync::normalize::{event_id, split_paragraphs};
use culture_sync::pipeline::SyncPipeline;
use culture_sync::progress::{RunStatus, SyncStatus};
use culture_sync::storage::{InMemoryStorage, Storage};
use culture_sync::translate::TranslateApi;
use culture_sync::types::{
    CanonicalEvent, EventFields, EventSource, EventSourceApi, RawEventData,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// In-test provider: listing rows are plain JSON objects, details are keyed
/// by the provider-native ref. A ref in `detail_failures` makes the detail
/// fetch blow up like a flaky upstream would.
struct FakeSource {
    source: EventSource,
    rows: Vec<Value>,
    details: HashMap<String, Value>,
    detail_failures: HashSet<String>,
    listing_fails: bool,
}

impl FakeSource {
    fn new(source: EventSource, rows: Vec<Value>) -> Self {
        Self {
            source,
            rows,
            details: HashMap::new(),
            detail_failures: HashSet::new(),
            listing_fails: false,
        }
    }

    fn with_failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    fn with_detail(mut self, source_ref: &str, detail: Value) -> Self {
        self.details.insert(source_ref.to_string(), detail);
        self
    }

    fn with_detail_failure(mut self, source_ref: &str) -> Self {
        self.detail_failures.insert(source_ref.to_string());
        self
    }
}

#[async_trait]
impl EventSourceApi for FakeSource {
    fn source_name(&self) -> &'static str {
        match self.source {
            EventSource::CulturePortal => "culture_portal",
            EventSource::TourApi => "tour_api",
        }
    }

    fn source(&self) -> EventSource {
        self.source
    }

    async fn list_events(
        &self,
        _start_date: chrono::NaiveDate,
        _end_date: chrono::NaiveDate,
        _page: usize,
        _page_size: usize,
    ) -> Result<Vec<RawEventData>> {
        if self.listing_fails {
            return Err(SyncError::Api {
                message: "listing endpoint is down".to_string(),
            });
        }
        Ok(self.rows.clone())
    }

    async fn get_event_detail(&self, source_ref: &str) -> Result<Option<RawEventData>> {
        if self.detail_failures.contains(source_ref) {
            return Err(SyncError::Api {
                message: "detail fetch exploded".to_string(),
            });
        }
        Ok(self.details.get(source_ref).cloned())
    }

    fn to_canonical(&self, raw: &RawEventData) -> Result<CanonicalEvent> {
        let title = raw["title"]
            .as_str()
            .ok_or_else(|| SyncError::MissingField("title not found".into()))?;
        let source_ref = raw["ref"]
            .as_str()
            .ok_or_else(|| SyncError::MissingField("ref not found".into()))?;
        let start_date = raw["start"].as_str().unwrap_or("20240301").to_string();
        let end_date = raw["end"].as_str().unwrap_or(&start_date).to_string();

        Ok(CanonicalEvent {
            id: event_id(self.source, title, &start_date),
            source: self.source,
            source_ref: source_ref.to_string(),
            category: "performance".to_string(),
            title: title.to_string(),
            description: raw["summary"].as_str().unwrap_or("").to_string(),
            start_date,
            end_date,
            time: TIME_UNSPECIFIED.to_string(),
            price: PRICE_UNSPECIFIED.to_string(),
            location: "서울".to_string(),
            image_url: raw["image"].as_str().unwrap_or("").to_string(),
            long_description: vec![NO_DETAILS.to_string()],
            tips: Vec::new(),
        })
    }

    fn apply_detail(&self, event: &mut CanonicalEvent, detail: &RawEventData) {
        if let Some(synopsis) = detail["synopsis"].as_str() {
            event.long_description = split_paragraphs(synopsis);
        }
    }
}

/// Marks translated text so tests can tell the languages apart
struct TaggingTranslator;

#[async_trait]
impl TranslateApi for TaggingTranslator {
    async fn translate_fields(
        &self,
        fields: &EventFields,
        target_language: &str,
    ) -> Result<EventFields> {
        Ok(EventFields {
            title: format!("{} [{}]", fields.title, target_language),
            description: format!("{} [{}]", fields.description, target_language),
            long_description: fields
                .long_description
                .iter()
                .map(|p| format!("{} [{}]", p, target_language))
                .collect(),
            tips: fields.tips.clone(),
        })
    }
}

struct FailingTranslator;

#[async_trait]
impl TranslateApi for FailingTranslator {
    async fn translate_fields(
        &self,
        _fields: &EventFields,
        _target_language: &str,
    ) -> Result<EventFields> {
        Err(SyncError::Api {
            message: "translation service unavailable".to_string(),
        })
    }
}

struct RewritingMediaStore;

#[async_trait]
impl MediaStore for RewritingMediaStore {
    async fn store_media(&self, _source_url: &str, item_id: &str) -> String {
        format!("https://cdn.test/{}.jpg", item_id)
    }
}

fn languages() -> Vec<String> {
    ["ko", "en", "ja", "zh"].iter().map(|s| s.to_string()).collect()
}

fn row(reference: &str, title: &str, start: &str, end: &str) -> Value {
    json!({
        "ref": reference,
        "title": title,
        "start": start,
        "end": end,
        "summary": "자세한 공연 소개 문구입니다",
        "image": "https://img.test/poster.jpg"
    })
}

fn detail() -> Value {
    json!({"synopsis": "첫 문단.\n\n둘째 문단."})
}

fn build_pipeline(
    sources: Vec<Arc<dyn EventSourceApi>>,
    translator: Option<Arc<dyn TranslateApi>>,
    media: Option<Arc<dyn MediaStore>>,
    storage: Arc<InMemoryStorage>,
) -> Arc<SyncPipeline> {
    Arc::new(SyncPipeline::new(
        sources,
        translator,
        media,
        storage,
        languages(),
        50,
    ))
}

async fn wait_for_terminal(pipeline: &SyncPipeline, run_id: &str) -> SyncStatus {
    let mut last_processed = 0;
    for _ in 0..100 {
        if let Some(status) = pipeline.get_status(run_id).await.unwrap() {
            // processed never goes backwards while we watch
            assert!(status.processed >= last_processed);
            last_processed = status.processed;
            if status.status != RunStatus::Running {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} never reached a terminal status", run_id);
}

#[tokio::test]
async fn full_run_persists_one_document_per_language() -> anyhow::Result<()> {
    let primary = FakeSource::new(
        EventSource::CulturePortal,
        vec![row("p1", "봄 재즈의 밤", "20240301", "20240310")],
    )
    .with_detail("p1", detail());

    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = build_pipeline(
        vec![Arc::new(primary)],
        Some(Arc::new(TaggingTranslator)),
        None,
        storage.clone(),
    );

    let summary = pipeline.run_sync(None, None, None).await?;
    assert_eq!(summary.events_found, 1);
    assert_eq!(summary.events_processed, 1);
    assert_eq!(storage.document_count(), 4);

    let id = event_id(EventSource::CulturePortal, "봄 재즈의 밤", "20240301");
    let korean = storage
        .get_localized_event(&format!("ko-{}", id))
        .await?
        .expect("korean document");
    assert_eq!(korean.title, "봄 재즈의 밤");
    assert_eq!(korean.long_description.len(), 2);
    assert!(korean.created_at.is_some());

    let english = storage
        .get_localized_event(&format!("en-{}", id))
        .await?
        .expect("english document");
    assert_eq!(english.title, "봄 재즈의 밤 [en]");
    Ok(())
}

#[tokio::test]
async fn translation_outage_still_covers_every_language() -> anyhow::Result<()> {
    let primary = FakeSource::new(
        EventSource::CulturePortal,
        vec![row("p1", "여름 국악 무대", "20240701", "20240705")],
    )
    .with_detail("p1", detail());

    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = build_pipeline(
        vec![Arc::new(primary)],
        Some(Arc::new(FailingTranslator)),
        None,
        storage.clone(),
    );

    let summary = pipeline.run_sync(None, None, None).await?;
    assert_eq!(summary.events_processed, 1);
    assert_eq!(storage.document_count(), 4);

    // Every language fell back to the source text instead of going missing
    let id = event_id(EventSource::CulturePortal, "여름 국악 무대", "20240701");
    for language in languages() {
        let doc = storage
            .get_localized_event(&format!("{}-{}", language, id))
            .await?
            .expect("document for language");
        assert_eq!(doc.title, "여름 국악 무대");
    }
    Ok(())
}

#[tokio::test]
async fn rerun_upserts_instead_of_duplicating() -> anyhow::Result<()> {
    let storage = Arc::new(InMemoryStorage::new());

    for _ in 0..2 {
        let primary = FakeSource::new(
            EventSource::CulturePortal,
            vec![row("p1", "겨울 연극제", "20241201", "20241215")],
        )
        .with_detail("p1", detail());
        let pipeline = build_pipeline(
            vec![Arc::new(primary)],
            None,
            None,
            storage.clone(),
        );
        let summary = pipeline.run_sync(None, None, None).await?;
        assert_eq!(summary.events_processed, 1);
    }

    assert_eq!(storage.document_count(), 4);
    Ok(())
}

#[tokio::test]
async fn cross_source_duplicates_collapse_to_the_richer_record() -> anyhow::Result<()> {
    // Primary row carries a summary and an image; the overlapping secondary
    // row is bare, so the primary record must win. The disjoint secondary
    // row is a separate real event and must survive.
    let primary = FakeSource::new(
        EventSource::CulturePortal,
        vec![row("p1", "봄 재즈의 밤", "20240301", "20240310")],
    )
    .with_detail("p1", detail());

    let overlap = json!({"ref": "t1", "title": "봄 재즈의 밤", "start": "20240305", "end": "20240305"});
    let disjoint = json!({"ref": "t2", "title": "봄 재즈의 밤", "start": "20240601", "end": "20240605"});
    let secondary = FakeSource::new(EventSource::TourApi, vec![overlap, disjoint])
        .with_detail("t1", detail())
        .with_detail("t2", detail());

    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = build_pipeline(
        vec![Arc::new(primary), Arc::new(secondary)],
        None,
        None,
        storage.clone(),
    );

    let summary = pipeline.run_sync(None, None, None).await?;
    assert_eq!(summary.events_found, 2);
    assert_eq!(summary.events_processed, 2);

    // The surviving duplicate is the primary-source record
    let winner_id = event_id(EventSource::CulturePortal, "봄 재즈의 밤", "20240301");
    assert!(storage
        .get_localized_event(&format!("ko-{}", winner_id))
        .await?
        .is_some());

    let loser_id = event_id(EventSource::TourApi, "봄 재즈의 밤", "20240305");
    assert!(storage
        .get_localized_event(&format!("ko-{}", loser_id))
        .await?
        .is_none());

    let recurring_id = event_id(EventSource::TourApi, "봄 재즈의 밤", "20240601");
    assert!(storage
        .get_localized_event(&format!("ko-{}", recurring_id))
        .await?
        .is_some());
    Ok(())
}

#[tokio::test]
async fn one_bad_item_does_not_stop_the_batch() -> anyhow::Result<()> {
    let primary = FakeSource::new(
        EventSource::CulturePortal,
        vec![
            row("gone", "사라진 공연", "20240101", "20240102"),
            row("boom", "터지는 공연", "20240201", "20240202"),
            row("fine", "멀쩡한 공연", "20240301", "20240302"),
        ],
    )
    // "gone" has no detail entry: the provider answers not-found
    .with_detail_failure("boom")
    .with_detail("fine", detail());

    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = build_pipeline(vec![Arc::new(primary)], None, None, storage.clone());

    let summary = pipeline.run_sync(None, None, None).await?;
    assert_eq!(summary.events_found, 3);
    assert_eq!(summary.events_processed, 1);

    let survivor = event_id(EventSource::CulturePortal, "멀쩡한 공연", "20240301");
    assert!(storage
        .get_localized_event(&format!("ko-{}", survivor))
        .await?
        .is_some());
    Ok(())
}

#[tokio::test]
async fn media_enrichment_rewrites_the_image_url() -> anyhow::Result<()> {
    let primary = FakeSource::new(
        EventSource::CulturePortal,
        vec![row("p1", "사진 있는 공연", "20240401", "20240402")],
    )
    .with_detail("p1", detail());

    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = build_pipeline(
        vec![Arc::new(primary)],
        None,
        Some(Arc::new(RewritingMediaStore)),
        storage.clone(),
    );

    pipeline.run_sync(None, None, None).await?;

    let id = event_id(EventSource::CulturePortal, "사진 있는 공연", "20240401");
    let doc = storage
        .get_localized_event(&format!("ko-{}", id))
        .await?
        .expect("document");
    assert_eq!(doc.image_url, format!("https://cdn.test/{}.jpg", id));
    Ok(())
}

#[tokio::test]
async fn async_run_reaches_terminal_status() -> anyhow::Result<()> {
    let primary = FakeSource::new(
        EventSource::CulturePortal,
        vec![
            row("p1", "공연 하나", "20240301", "20240302"),
            row("p2", "공연 둘", "20240401", "20240402"),
        ],
    )
    .with_detail("p1", detail())
    .with_detail("p2", detail());

    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = build_pipeline(vec![Arc::new(primary)], None, None, storage.clone());

    let run_id = pipeline.run_sync_async(None, None).await?;
    // The status record exists before the batch finishes
    assert!(pipeline.get_status(&run_id).await?.is_some());

    let status = wait_for_terminal(&pipeline, &run_id).await;
    assert_eq!(status.status, RunStatus::Completed);
    assert_eq!(status.progress, 100);
    assert_eq!(status.processed, status.total);
    assert_eq!(status.total, 2);
    assert!(status.completed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn listing_failure_is_fatal_and_recorded() -> anyhow::Result<()> {
    let primary =
        FakeSource::new(EventSource::CulturePortal, Vec::new()).with_failing_listing();
    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = build_pipeline(vec![Arc::new(primary)], None, None, storage.clone());

    // Blocking shape: the error propagates to the caller
    assert!(pipeline.run_sync(None, None, None).await.is_err());

    // Fire-and-forget shape: the failure is only observable via the status
    let run_id = pipeline.run_sync_async(None, None).await?;
    let status = wait_for_terminal(&pipeline, &run_id).await;
    assert_eq!(status.status, RunStatus::Error);
    assert!(status.error.unwrap().contains("listing endpoint is down"));
    Ok(())
}

#[tokio::test]
async fn async_run_with_bad_dates_is_rejected_up_front() {
    let primary = FakeSource::new(EventSource::CulturePortal, Vec::new());
    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = build_pipeline(vec![Arc::new(primary)], None, None, storage);

    let result = pipeline
        .run_sync_async(Some("not-a-date".to_string()), None)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn unsupported_language_codes_are_dropped() -> anyhow::Result<()> {
    let primary = FakeSource::new(
        EventSource::CulturePortal,
        vec![row("p1", "언어 테스트", "20240501", "20240502")],
    )
    .with_detail("p1", detail());

    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = build_pipeline(vec![Arc::new(primary)], None, None, storage.clone());

    pipeline
        .run_sync(None, None, Some(vec!["fr".to_string(), "en".to_string()]))
        .await?;

    // "fr" is outside the supported set and gets dropped; "en" survives
    assert_eq!(storage.document_count(), 1);
    let id = event_id(EventSource::CulturePortal, "언어 테스트", "20240501");
    assert!(storage
        .get_localized_event(&format!("en-{}", id))
        .await?
        .is_some());
    Ok(())
}
