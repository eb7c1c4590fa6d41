//! Latest-photo lookup against a Supabase Storage bucket.
//!
//! Endpoint:
//!   POST {supabase_url}/storage/v1/object/list/{bucket}
//!
//! Public objects are served from
//!   {supabase_url}/storage/v1/object/public/{bucket}/{name}

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::SnapError;

/// Marker object Supabase drops into otherwise empty folders.
pub const PLACEHOLDER_NAME: &str = ".emptyFolderPlaceholder";

/// Two rows cover the case where the newest object is the placeholder.
const LIST_LIMIT: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl StoredFile {
    pub fn new(name: &str, created_at: &str) -> Self {
        StoredFile {
            name: name.to_string(),
            created_at: Some(created_at.to_string()),
        }
    }
}

#[async_trait]
pub trait PhotoLister: Send + Sync {
    /// Newest objects in the collection, up to `limit`.
    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredFile>, SnapError>;

    /// Public URL prefix that object names are appended to.
    fn public_url_prefix(&self) -> String;
}

pub struct SupabaseBucket {
    http: reqwest::Client,
    list_url: String,
    public_prefix: String,
    api_key: String,
}

impl SupabaseBucket {
    pub fn new(config: &Config) -> Self {
        SupabaseBucket {
            http: reqwest::Client::new(),
            list_url: config.list_url(),
            public_prefix: config.public_url_prefix(),
            api_key: config.supabase_key.clone(),
        }
    }

    fn list_body(limit: usize) -> serde_json::Value {
        json!({
            "prefix": "",
            "limit": limit,
            "offset": 0,
            "sortBy": {
                "column": "created_at",
                "order": "desc",
            },
        })
    }
}

#[async_trait]
impl PhotoLister for SupabaseBucket {
    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredFile>, SnapError> {
        let response = self
            .http
            .post(&self.list_url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&Self::list_body(limit))
            .send()
            .await
            .map_err(|e| SnapError::Fetch(format!("Failed to fetch photo list: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = upstream_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").into());
            warn!(status = status.as_u16(), %message, "photo list request failed");
            return Err(SnapError::Fetch(format!(
                "Failed to fetch photo list: {message}"
            )));
        }

        let files: Vec<StoredFile> = response
            .json()
            .await
            .map_err(|e| SnapError::Fetch(format!("Failed to parse photo list: {e}")))?;
        debug!(count = files.len(), "photo list received");
        Ok(files)
    }

    fn public_url_prefix(&self) -> String {
        self.public_prefix.clone()
    }
}

/// Supabase error bodies look like `{"statusCode":"404","error":"...","message":"..."}`.
fn upstream_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.trim().is_empty())
        .map(|m| m.to_string())
}

/// Parse a `created_at` value. Accepts RFC 3339, offset-less date-times
/// (taken as UTC) and plain dates.
fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Pick the newest real photo from a listing.
///
/// Rows are ordered by parsed `created_at` descending here as well, so the
/// result does not depend on the server honoring `sortBy`. Rows whose
/// timestamp is missing or unparseable sort last. Placeholder rows are
/// skipped.
pub fn select_latest_file(files: &[StoredFile]) -> Result<&StoredFile, SnapError> {
    let mut candidates: Vec<(Option<DateTime<Utc>>, &StoredFile)> = files
        .iter()
        .filter(|f| f.name != PLACEHOLDER_NAME)
        .map(|f| (f.created_at.as_deref().and_then(parse_created_at), f))
        .collect();
    // Stable: rows with equal or missing timestamps keep server order.
    candidates.sort_by(|a, b| b.0.cmp(&a.0));
    let candidates: Vec<&StoredFile> = candidates.into_iter().map(|(_, f)| f).collect();

    let latest = candidates.first().copied().ok_or(SnapError::NoPhotosFound)?;
    if latest.name.trim().is_empty() {
        return Err(SnapError::Fetch(
            "Received invalid file data from the photo bucket.".into(),
        ));
    }
    Ok(latest)
}

/// Public URL of the most recently uploaded photo.
pub async fn latest_photo_url(lister: &dyn PhotoLister) -> Result<String, SnapError> {
    let files = lister.list_recent(LIST_LIMIT).await?;
    let latest = select_latest_file(&files)?;
    let url = format!("{}{}", lister.public_url_prefix(), latest.name);
    debug!(%url, "resolved latest photo");
    Ok(url)
}
