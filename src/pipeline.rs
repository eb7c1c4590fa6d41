//! Composition of the sniffer, converter, history cache and remote services
//! into the flows the CLI and the HTTP endpoint expose.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::SnapError;
use crate::fetch::{image_url_to_base64, ByteFetcher};
use crate::history::{ImageHistory, KeyValueStore};
use crate::image_utils::EncodedImage;
use crate::payload::{normalize_pasted, parse_payload_url};
use crate::photo_bucket::{latest_photo_url, PhotoLister};
use crate::vision::{ImageClassifier, TrashCheck};

/// Pasted Base64 (or data URL) → display-ready data URL. Not recorded.
pub fn render_base64(input: &str) -> Result<String, SnapError> {
    normalize_pasted(input).map(|img| img.to_data_url())
}

/// Payload URL → data URL, recorded in history. `Ok(None)` when the location
/// carries no payload.
pub fn render_payload_url<S: KeyValueStore>(
    history: &ImageHistory<S>,
    location: &str,
) -> Result<Option<String>, SnapError> {
    let Some(image) = parse_payload_url(location)? else {
        return Ok(None);
    };
    let data_url = image.to_data_url();
    history.add_to_history(&data_url);
    Ok(Some(data_url))
}

/// Download a remote image and record it in history.
pub async fn render_remote_image<S: KeyValueStore>(
    fetcher: &dyn ByteFetcher,
    history: &ImageHistory<S>,
    url: &str,
) -> Result<EncodedImage, SnapError> {
    let image = image_url_to_base64(fetcher, url).await?;
    history.add_to_history(&image.to_data_url());
    Ok(image)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub photo_url: String,
    pub analysis: TrashCheck,
}

/// Latest bucket photo → download → litter check.
pub async fn run_check(
    lister: &dyn PhotoLister,
    fetcher: &dyn ByteFetcher,
    classifier: &dyn ImageClassifier,
) -> Result<CheckReport, SnapError> {
    let photo_url = latest_photo_url(lister).await?;
    let image = image_url_to_base64(fetcher, &photo_url).await?;
    let analysis = classifier.check_for_trash_and_bottle(&image).await?;
    info!(
        %photo_url,
        has_trash = analysis.has_trash,
        has_plastic_bottle = analysis.has_plastic_bottle,
        "check complete"
    );
    Ok(CheckReport {
        photo_url,
        analysis,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Success,
    Error,
}

/// JSON envelope returned by the check endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub status: CheckStatus,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CheckReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResponse {
    pub fn from_result(result: Result<CheckReport, SnapError>, now: DateTime<Utc>) -> Self {
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        match result {
            Ok(report) => CheckResponse {
                status: CheckStatus::Success,
                timestamp,
                data: Some(report),
                error: None,
            },
            Err(e) => {
                error!(kind = e.kind(), error = %e, "check failed");
                Self::failure(e.to_string(), now)
            }
        }
    }

    /// Error envelope for a request rejected before any check ran.
    pub fn failure(message: impl Into<String>, now: DateTime<Utc>) -> Self {
        CheckResponse {
            status: CheckStatus::Error,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CheckStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryStore;

    #[test]
    fn test_render_base64() {
        assert_eq!(
            render_base64("R0lGODlhAQABAIAAAP").unwrap(),
            "data:image/gif;base64,R0lGODlhAQABAIAAAP"
        );
        assert!(matches!(
            render_base64("zzz"),
            Err(SnapError::UnrecognizedFormat)
        ));
    }

    #[test]
    fn test_render_payload_records_history() {
        let history = ImageHistory::new(MemoryStore::new());
        let url = render_payload_url(&history, "https://app.test/#b64=%2F9j%2F4AAQSkZJRg%3D%3D")
            .unwrap()
            .unwrap();
        assert_eq!(url, "data:image/jpeg;base64,/9j/4AAQSkZJRg==");
        assert_eq!(history.get_history(), vec![url]);
    }

    #[test]
    fn test_render_payload_without_payload_leaves_history_alone() {
        let history = ImageHistory::new(MemoryStore::new());
        assert!(render_payload_url(&history, "https://app.test/")
            .unwrap()
            .is_none());
        assert!(render_payload_url(&history, "https://app.test/#b64=zzzz").is_err());
        assert!(history.get_history().is_empty());
    }

    #[test]
    fn test_check_response_shapes() {
        let now = DateTime::parse_from_rfc3339("2024-01-03T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let ok = CheckResponse::from_result(
            Ok(CheckReport {
                photo_url: "https://x/c.jpg".into(),
                analysis: TrashCheck {
                    has_trash: true,
                    has_plastic_bottle: false,
                },
            }),
            now,
        );
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["timestamp"], "2024-01-03T10:00:00.000Z");
        assert_eq!(json["data"]["photoUrl"], "https://x/c.jpg");
        assert_eq!(json["data"]["analysis"]["hasTrash"], true);
        assert!(json.get("error").is_none());

        let err = CheckResponse::from_result(Err(SnapError::NoPhotosFound), now);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "No photos found in the collection.");
        assert!(json.get("data").is_none());
        assert!(!err.is_success());
    }

    #[test]
    fn test_failure_envelope() {
        let now = DateTime::parse_from_rfc3339("2024-01-03T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let response = CheckResponse::failure("Method PUT Not Allowed", now);
        assert_eq!(response.status, CheckStatus::Error);
        assert_eq!(response.timestamp, "2024-01-03T10:00:00.000Z");
        assert_eq!(response.error.as_deref(), Some("Method PUT Not Allowed"));
        assert!(response.data.is_none());
    }
}
