use crate::error::{Result, SyncError};
use crate::progress::SyncStatus;
use crate::types::LocalizedEvent;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Storage trait for localized event documents and run status records
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write one localized document per language for a canonical event.
    /// The batch is atomic for that event and keyed `{language}-{id}`, so
    /// re-running a sync upserts instead of duplicating. Merge semantics:
    /// `created_at` survives updates, `updated_at` is refreshed.
    async fn upsert_localized_events(
        &self,
        canonical_id: &str,
        events: &[LocalizedEvent],
    ) -> Result<()>;

    async fn get_localized_event(&self, doc_key: &str) -> Result<Option<LocalizedEvent>>;

    // Sync status operations, all merge-semantics writes keyed by run id
    async fn create_sync_status(&self, status: &SyncStatus) -> Result<()>;
    async fn update_sync_status(&self, status: &SyncStatus) -> Result<()>;
    async fn get_sync_status(&self, run_id: &str) -> Result<Option<SyncStatus>>;
}

/// In-memory storage implementation for development/testing
pub struct InMemoryStorage {
    documents: Arc<Mutex<HashMap<String, LocalizedEvent>>>,
    statuses: Arc<Mutex<HashMap<String, SyncStatus>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(Mutex::new(HashMap::new())),
            statuses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Total persisted documents across all languages
    pub fn document_count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn upsert_localized_events(
        &self,
        canonical_id: &str,
        events: &[LocalizedEvent],
    ) -> Result<()> {
        let now = Utc::now();
        let mut documents = self.documents.lock().unwrap();
        for event in events {
            let key = event.doc_key();
            let mut record = event.clone();
            record.updated_at = Some(now);
            record.created_at = documents
                .get(&key)
                .and_then(|existing| existing.created_at)
                .or(Some(now));
            documents.insert(key, record);
        }
        debug!(
            "Upserted {} localized documents for event {}",
            events.len(),
            canonical_id
        );
        Ok(())
    }

    async fn get_localized_event(&self, doc_key: &str) -> Result<Option<LocalizedEvent>> {
        let documents = self.documents.lock().unwrap();
        Ok(documents.get(doc_key).cloned())
    }

    async fn create_sync_status(&self, status: &SyncStatus) -> Result<()> {
        let mut statuses = self.statuses.lock().unwrap();
        statuses.insert(status.run_id.clone(), status.clone());
        debug!("Created sync status for run {}", status.run_id);
        Ok(())
    }

    async fn update_sync_status(&self, status: &SyncStatus) -> Result<()> {
        let mut statuses = self.statuses.lock().unwrap();
        statuses.insert(status.run_id.clone(), status.clone());
        Ok(())
    }

    async fn get_sync_status(&self, run_id: &str) -> Result<Option<SyncStatus>> {
        let statuses = self.statuses.lock().unwrap();
        Ok(statuses.get(run_id).cloned())
    }
}

/// Supabase (PostgREST) backed storage. Documents land in the
/// `localized_events` table keyed by `doc_key`, run records in `sync_runs`
/// keyed by `run_id`.
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl SupabaseStorage {
    const EVENTS_TABLE: &'static str = "localized_events";
    const RUNS_TABLE: &'static str = "sync_runs";

    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok().or_else(|| {
            std::env::var("SUPABASE_PROJECT_REF")
                .ok()
                .map(|r| format!("https://{}.supabase.co", r))
        })?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok()?;

        Some(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("apikey", self.service_key.clone())
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Storage(format!(
                "{} failed with status {}: {}",
                action,
                status.as_u16(),
                body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Storage for SupabaseStorage {
    async fn upsert_localized_events(
        &self,
        canonical_id: &str,
        events: &[LocalizedEvent],
    ) -> Result<()> {
        let now = Utc::now();
        let rows: Vec<serde_json::Value> = events
            .iter()
            .map(|event| {
                let mut row = serde_json::to_value(event).unwrap_or_default();
                // created_at is a server-side column default; merge keeps it
                if let Some(map) = row.as_object_mut() {
                    map.insert("doc_key".to_string(), event.doc_key().into());
                    map.remove("created_at");
                    map.insert("updated_at".to_string(), now.to_rfc3339().into());
                }
                row
            })
            .collect();

        // One request per canonical event keeps the per-event batch atomic
        let response = self
            .authed(self.client.post(self.table_url(Self::EVENTS_TABLE)))
            .query(&[("on_conflict", "doc_key")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows)
            .send()
            .await?;
        Self::check(response, "document upsert").await?;

        debug!(
            "Upserted {} localized documents for event {}",
            events.len(),
            canonical_id
        );
        Ok(())
    }

    async fn get_localized_event(&self, doc_key: &str) -> Result<Option<LocalizedEvent>> {
        let response = self
            .authed(self.client.get(self.table_url(Self::EVENTS_TABLE)))
            .query(&[("doc_key", format!("eq.{}", doc_key)), ("limit", "1".to_string())])
            .send()
            .await?;
        let response = Self::check(response, "document read").await?;
        let mut rows: Vec<LocalizedEvent> = response.json().await?;
        Ok(rows.pop())
    }

    async fn create_sync_status(&self, status: &SyncStatus) -> Result<()> {
        let response = self
            .authed(self.client.post(self.table_url(Self::RUNS_TABLE)))
            .query(&[("on_conflict", "run_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&vec![status])
            .send()
            .await?;
        Self::check(response, "status create").await?;
        Ok(())
    }

    async fn update_sync_status(&self, status: &SyncStatus) -> Result<()> {
        let response = self
            .authed(self.client.patch(self.table_url(Self::RUNS_TABLE)))
            .query(&[("run_id", format!("eq.{}", status.run_id))])
            .header("Prefer", "return=minimal")
            .json(status)
            .send()
            .await?;
        Self::check(response, "status update").await?;
        Ok(())
    }

    async fn get_sync_status(&self, run_id: &str) -> Result<Option<SyncStatus>> {
        let response = self
            .authed(self.client.get(self.table_url(Self::RUNS_TABLE)))
            .query(&[("run_id", format!("eq.{}", run_id)), ("limit", "1".to_string())])
            .send()
            .await?;
        let response = Self::check(response, "status read").await?;
        let mut rows: Vec<SyncStatus> = response.json().await?;
        Ok(rows.pop())
    }
}

/// Pick the storage backend from the environment: Supabase when configured,
/// otherwise in-memory (documents and run status vanish with the process).
pub fn storage_from_env() -> Arc<dyn Storage> {
    match SupabaseStorage::from_env() {
        Some(storage) => Arc::new(storage),
        None => {
            warn!("SUPABASE_URL/SUPABASE_SERVICE_ROLE_KEY not set, using in-memory storage");
            Arc::new(InMemoryStorage::new())
        }
    }
}
