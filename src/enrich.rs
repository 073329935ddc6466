use crate::error::{Result, SyncError};
use async_trait::async_trait;
use tracing::{debug, warn};

/// External media-storage collaborator. Re-hosts a provider image at a
/// durable URL. On any failure the original URL is returned unchanged, so
/// the call never fails the item it is enriching.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store_media(&self, source_url: &str, item_id: &str) -> String;
}

/// Supabase Storage backed implementation. Downloads the provider image and
/// uploads it into the configured bucket under `events/<item_id>/`.
///
/// Config via env:
/// - SUPABASE_URL (e.g., https://xyzcompany.supabase.co) OR SUPABASE_PROJECT_REF
/// - SUPABASE_SERVICE_ROLE_KEY (service role key)
/// - SUPABASE_BUCKET (bucket name)
/// - SUPABASE_PREFIX (optional path prefix inside bucket)
pub struct SupabaseMediaStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
    prefix: String,
}

impl SupabaseMediaStore {
    /// Returns `None` when the storage credentials are not configured; the
    /// pipeline then keeps original provider URLs.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok().or_else(|| {
            std::env::var("SUPABASE_PROJECT_REF")
                .ok()
                .map(|r| format!("https://{}.supabase.co", r))
        })?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok()?;
        let bucket = std::env::var("SUPABASE_BUCKET").ok()?;
        let prefix = std::env::var("SUPABASE_PREFIX").unwrap_or_default();

        Some(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            bucket,
            prefix,
        })
    }

    fn object_path(&self, item_id: &str, source_url: &str) -> String {
        let file_name = source_url
            .split('/')
            .last()
            .map(|name| name.split('?').next().unwrap_or(name))
            .filter(|name| !name.is_empty())
            .unwrap_or("image");
        if self.prefix.is_empty() {
            format!("events/{}/{}", item_id, file_name)
        } else {
            format!(
                "{}/events/{}/{}",
                self.prefix.trim_end_matches('/'),
                item_id,
                file_name
            )
        }
    }

    async fn transfer(&self, source_url: &str, item_id: &str) -> Result<String> {
        let download = self.client.get(source_url).send().await?;
        let status = download.status();
        if !status.is_success() {
            return Err(SyncError::Api {
                message: format!("image download failed with status {}", status.as_u16()),
            });
        }
        let content_type = download
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = download.bytes().await?;

        let path = self.object_path(item_id, source_url);
        let endpoint = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, path
        );

        // Upload with upsert=true (idempotent for re-runs of the same item)
        let upload = self
            .client
            .put(&endpoint)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("apikey", self.service_key.clone())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .query(&[("upsert", "true")])
            .body(bytes.to_vec())
            .send()
            .await?;
        let status = upload.status();
        if !status.is_success() {
            return Err(SyncError::Api {
                message: format!("image upload failed with status {}", status.as_u16()),
            });
        }

        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        ))
    }
}

#[async_trait]
impl MediaStore for SupabaseMediaStore {
    async fn store_media(&self, source_url: &str, item_id: &str) -> String {
        if source_url.is_empty() {
            return String::new();
        }
        match self.transfer(source_url, item_id).await {
            Ok(durable_url) => {
                debug!("Re-hosted image for {} at {}", item_id, durable_url);
                durable_url
            }
            Err(e) => {
                warn!(
                    "Media transfer failed for {}, keeping original URL: {}",
                    item_id, e
                );
                source_url.to_string()
            }
        }
    }
}
