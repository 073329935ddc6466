use crate::constants::{is_supported_language, MAX_PAGE_SIZE};
use crate::dedupe::dedupe_events;
use crate::enrich::MediaStore;
use crate::error::{Result, SyncError};
use crate::normalize::parse_yyyymmdd;
use crate::progress::{ProgressReporter, SyncStatus};
use crate::storage::Storage;
use crate::translate::{localize_event, TranslateApi};
use crate::types::{CanonicalEvent, EventSourceApi, LocalizedEvent, SyncSummary};
use chrono::{Months, NaiveDate, Utc};
use metrics::{counter, histogram};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Drives one batch run end to end: list from every source, normalize,
/// dedupe, then walk the surviving events sequentially through detail,
/// media enrichment, translation, and persistence.
///
/// Collaborators are injected once at construction so tests can substitute
/// fakes for every external service. Items are processed strictly one at a
/// time; the per-item steps hit rate-limited paid APIs and progress
/// reporting depends on sequential completion.
#[derive(Clone)]
pub struct SyncPipeline {
    sources: Vec<Arc<dyn EventSourceApi>>,
    translator: Option<Arc<dyn TranslateApi>>,
    media: Option<Arc<dyn MediaStore>>,
    storage: Arc<dyn Storage>,
    reporter: ProgressReporter,
    languages: Vec<String>,
    page_size: usize,
}

impl SyncPipeline {
    pub fn new(
        sources: Vec<Arc<dyn EventSourceApi>>,
        translator: Option<Arc<dyn TranslateApi>>,
        media: Option<Arc<dyn MediaStore>>,
        storage: Arc<dyn Storage>,
        languages: Vec<String>,
        page_size: usize,
    ) -> Self {
        let reporter = ProgressReporter::new(storage.clone());
        Self {
            sources,
            translator,
            media,
            storage,
            reporter,
            languages,
            // Every listed event fans out into detail/media/translation
            // calls, so the page size is capped no matter what the config
            // asks for.
            page_size: page_size.min(MAX_PAGE_SIZE),
        }
    }

    /// Resolve the requested window, defaulting to one month back through
    /// one month ahead. Dates arrive in `YYYYMMDD` form.
    fn resolve_window(
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<(NaiveDate, NaiveDate)> {
        let today = Utc::now().date_naive();
        let start = match start_date {
            Some(raw) => parse_yyyymmdd(raw).ok_or_else(|| {
                SyncError::Config(format!("invalid start_date '{}', expected YYYYMMDD", raw))
            })?,
            None => today.checked_sub_months(Months::new(1)).unwrap_or(today),
        };
        let end = match end_date {
            Some(raw) => parse_yyyymmdd(raw).ok_or_else(|| {
                SyncError::Config(format!("invalid end_date '{}', expected YYYYMMDD", raw))
            })?,
            None => today.checked_add_months(Months::new(1)).unwrap_or(today),
        };
        if start > end {
            return Err(SyncError::Config(format!(
                "start_date {} is after end_date {}",
                start, end
            )));
        }
        Ok((start, end))
    }

    fn resolve_languages(&self, requested: Option<Vec<String>>) -> Vec<String> {
        let requested = match requested {
            Some(languages) if !languages.is_empty() => languages,
            _ => return self.languages.clone(),
        };

        let (supported, unknown): (Vec<String>, Vec<String>) = requested
            .into_iter()
            .partition(|lang| is_supported_language(lang));
        if !unknown.is_empty() {
            warn!("Ignoring unsupported language codes: {}", unknown.join(", "));
        }
        if supported.is_empty() {
            self.languages.clone()
        } else {
            supported
        }
    }

    /// Blocking invocation: awaits the whole batch, propagates a fatal run
    /// error to the caller after recording it.
    pub async fn run_sync(
        &self,
        start_date: Option<&str>,
        end_date: Option<&str>,
        target_languages: Option<Vec<String>>,
    ) -> Result<SyncSummary> {
        let run_id = Uuid::new_v4().to_string();
        let (start, end) = Self::resolve_window(start_date, end_date)?;
        let languages = self.resolve_languages(target_languages);

        self.reporter.create(&run_id).await;
        match self.execute(&run_id, start, end, &languages).await {
            Ok(summary) => {
                self.reporter.complete(&run_id).await;
                Ok(summary)
            }
            Err(e) => {
                error!("Sync run {} failed: {}", run_id, e);
                self.reporter.fail(&run_id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Fire-and-forget invocation: returns the run id immediately; the
    /// outcome is observable only through [`SyncPipeline::get_status`].
    /// The status record is created before the task is spawned so a poll
    /// issued right after the call already finds it.
    pub async fn run_sync_async(
        &self,
        start_date: Option<String>,
        end_date: Option<String>,
    ) -> Result<String> {
        let run_id = Uuid::new_v4().to_string();
        let (start, end) = Self::resolve_window(start_date.as_deref(), end_date.as_deref())?;
        let languages = self.languages.clone();

        self.reporter.create(&run_id).await;

        let pipeline = self.clone();
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            match pipeline
                .execute(&task_run_id, start, end, &languages)
                .await
            {
                Ok(summary) => {
                    pipeline.reporter.complete(&task_run_id).await;
                    info!(
                        "Async sync run {} completed: {}/{} events persisted",
                        task_run_id, summary.events_processed, summary.events_found
                    );
                }
                Err(e) => {
                    error!("Async sync run {} failed: {}", task_run_id, e);
                    pipeline.reporter.fail(&task_run_id, &e.to_string()).await;
                }
            }
        });

        Ok(run_id)
    }

    pub async fn get_status(&self, run_id: &str) -> Result<Option<SyncStatus>> {
        self.storage.get_sync_status(run_id).await
    }

    #[instrument(skip(self, languages), fields(run_id = %run_id))]
    async fn execute(
        &self,
        run_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        languages: &[String],
    ) -> Result<SyncSummary> {
        counter!("cs_sync_runs_total").increment(1);
        let t_run = std::time::Instant::now();
        info!("🚀 Starting sync for {} - {}", start, end);
        println!("🚀 Starting sync for {} - {}", start, end);

        // Step 1: list one bounded page per source and normalize. A listing
        // failure here is fatal to the run; a malformed row is only a skip.
        let mut canonical: Vec<CanonicalEvent> = Vec::new();
        for source in &self.sources {
            let t_fetch = std::time::Instant::now();
            let rows = source.list_events(start, end, 1, self.page_size).await?;
            histogram!("cs_fetch_duration_seconds", "source" => source.source_name())
                .record(t_fetch.elapsed().as_secs_f64());

            for raw in &rows {
                match source.to_canonical(raw) {
                    Ok(event) => canonical.push(event),
                    Err(e) => {
                        warn!(
                            "Skipping malformed {} record: {}",
                            source.source_name(),
                            e
                        );
                        counter!("cs_malformed_records_total", "source" => source.source_name())
                            .increment(1);
                    }
                }
            }
        }
        info!("✅ Normalized {} raw records", canonical.len());
        println!("✅ Normalized {} raw records", canonical.len());

        // Step 2: collapse cross-source duplicates
        let events = dedupe_events(canonical);
        let total = events.len();
        info!("✅ {} events after cross-source dedup", total);
        println!("✅ {} events after cross-source dedup", total);
        self.reporter
            .update(run_id, 0, total, "Processing events")
            .await;

        // Step 3: per-event loop. One item's failure never aborts the
        // batch; every outcome advances the progress record.
        let mut processed = 0usize;
        let mut persisted = 0usize;
        for event in &events {
            match self.process_event(event, languages).await {
                Ok(true) => {
                    persisted += 1;
                }
                Ok(false) => {
                    info!("⏭  Skipping '{}': detail no longer available", event.title);
                    counter!("cs_events_skipped_total").increment(1);
                }
                Err(e) => {
                    warn!("Failed to process '{}', continuing: {}", event.title, e);
                    counter!("cs_event_errors_total").increment(1);
                }
            }
            processed += 1;
            self.reporter
                .update(
                    run_id,
                    processed,
                    total,
                    &format!("Processed {}/{} events", processed, total),
                )
                .await;
        }

        let total_secs = t_run.elapsed().as_secs_f64();
        histogram!("cs_sync_duration_seconds").record(total_secs);
        counter!("cs_events_processed_total").increment(persisted as u64);
        info!(
            "✅ Sync finished: {}/{} events persisted in {:.1}s",
            persisted, total, total_secs
        );
        println!("✅ Sync finished: {}/{} events persisted", persisted, total);

        Ok(SyncSummary {
            events_found: total,
            events_processed: persisted,
        })
    }

    /// Walk one event through detail, enrichment, translation, and
    /// persistence. `Ok(false)` is the legitimate not-found skip; any error
    /// is caught by the caller and treated as a skip too.
    async fn process_event(&self, event: &CanonicalEvent, languages: &[String]) -> Result<bool> {
        let source = self
            .sources
            .iter()
            .find(|s| s.source() == event.source)
            .ok_or_else(|| SyncError::Api {
                message: format!("no adapter registered for source {:?}", event.source),
            })?;

        // Detailing
        let mut event = event.clone();
        match source.get_event_detail(&event.source_ref).await? {
            Some(detail) => source.apply_detail(&mut event, &detail),
            None => return Ok(false),
        }

        // Enriching: failure inside the store degrades to the original URL
        if let Some(media) = &self.media {
            if !event.image_url.is_empty() {
                event.image_url = media.store_media(&event.image_url, &event.id).await;
            }
        }

        // Translating: one bundle per requested language, guaranteed
        let localized = localize_event(self.translator.as_deref(), &event, languages).await;

        // Persisting: one atomic batch across all languages for this event
        let documents: Vec<LocalizedEvent> = languages
            .iter()
            .filter_map(|language| {
                localized
                    .get(language)
                    .map(|fields| LocalizedEvent::from_canonical(&event, fields, language))
            })
            .collect();
        self.storage
            .upsert_localized_events(&event.id, &documents)
            .await?;
        debug!(
            "Persisted {} language documents for {}",
            documents.len(),
            event.id
        );
        Ok(true)
    }
}
