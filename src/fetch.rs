//! URL → `{base64, mimeType}` conversion.
//!
//! The network read sits behind [`ByteFetcher`] so the conversion logic can be
//! driven by an in-memory fetcher in tests.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::SnapError;
use crate::image_utils::{base64_encode, EncodedImage, OCTET_STREAM};

const USER_AGENT: &str = concat!("snapb64/", env!("CARGO_PKG_VERSION"));

/// Raw result of a single retrieval, before any status handling.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedResource {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait ByteFetcher: Send + Sync {
    /// Retrieve `url`. Transport failures are errors; HTTP error statuses are
    /// returned as a normal `FetchedResource`.
    async fn fetch(&self, url: &str) -> Result<FetchedResource, SnapError>;
}

pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(timeout: Option<Duration>) -> Result<Self, SnapError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| SnapError::Fetch(format!("Failed to build HTTP client: {e}")))?;
        Ok(HttpFetcher { http })
    }
}

#[async_trait]
impl ByteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, SnapError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SnapError::Fetch(e.to_string()))?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = resp
            .bytes()
            .await
            .map_err(|e| SnapError::Fetch(format!("Failed to read response body: {e}")))?;

        Ok(FetchedResource {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            content_type,
            body: body.to_vec(),
        })
    }
}

/// Download an image and return it Base64-encoded with its media type.
///
/// The media type comes from `Content-Type` when present (parameters such as
/// `charset` are dropped) and is otherwise `application/octet-stream`. The
/// body is never sniffed here.
pub async fn image_url_to_base64(
    fetcher: &dyn ByteFetcher,
    url: &str,
) -> Result<EncodedImage, SnapError> {
    debug!(url, "fetching image");
    let resource = fetcher.fetch(url).await.map_err(|e| match e {
        SnapError::Fetch(msg) => SnapError::Fetch(format!("Failed to fetch image: {msg}")),
        other => other,
    })?;

    if !resource.is_success() {
        warn!(url, status = resource.status, "image fetch returned error status");
        let status = if resource.status_text.is_empty() {
            resource.status.to_string()
        } else {
            format!("{} {}", resource.status, resource.status_text)
        };
        return Err(SnapError::Fetch(format!(
            "Failed to fetch image: HTTP {status}"
        )));
    }

    let mime_type = media_type_from_header(resource.content_type.as_deref());
    let base64 = base64_encode(&resource.body);
    check_encoded_len(resource.body.len(), &base64)?;

    debug!(url, mime_type = %mime_type, bytes = resource.body.len(), "image converted");
    Ok(EncodedImage::new(base64, mime_type))
}

fn media_type_from_header(header: Option<&str>) -> String {
    header
        .and_then(|v| v.split(';').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(OCTET_STREAM)
        .to_ascii_lowercase()
}

fn check_encoded_len(raw_len: usize, encoded: &str) -> Result<(), SnapError> {
    let expected = raw_len.div_ceil(3) * 4;
    if encoded.len() != expected {
        return Err(SnapError::Encoding(format!(
            "expected {expected} Base64 characters for {raw_len} bytes, got {}",
            encoded.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticFetcher(FetchedResource);

    #[async_trait]
    impl ByteFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedResource, SnapError> {
            Ok(self.0.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ByteFetcher for FailingFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedResource, SnapError> {
            Err(SnapError::Fetch("connection refused".into()))
        }
    }

    fn ok(content_type: Option<&str>, body: &[u8]) -> StaticFetcher {
        StaticFetcher(FetchedResource {
            status: 200,
            status_text: "OK".into(),
            content_type: content_type.map(|s| s.to_string()),
            body: body.to_vec(),
        })
    }

    #[tokio::test]
    async fn test_uses_content_type_header() {
        let fetcher = ok(Some("image/png"), b"\x89PNG\r\n\x1a\n");
        let img = image_url_to_base64(&fetcher, "https://x/a.png").await.unwrap();
        assert_eq!(img.mime_type(), "image/png");
        assert_eq!(img.base64(), "iVBORw0KGgo=");
    }

    #[tokio::test]
    async fn test_header_is_trusted_over_bytes() {
        // PNG bytes served as JPEG: the header is authoritative.
        let fetcher = ok(Some("image/jpeg"), b"\x89PNG\r\n\x1a\n");
        let img = image_url_to_base64(&fetcher, "https://x/a").await.unwrap();
        assert_eq!(img.mime_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn test_missing_or_blank_content_type_falls_back() {
        let img = image_url_to_base64(&ok(None, b"abc"), "u").await.unwrap();
        assert_eq!(img.mime_type(), "application/octet-stream");

        let img = image_url_to_base64(&ok(Some("  "), b"abc"), "u").await.unwrap();
        assert_eq!(img.mime_type(), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_content_type_parameters_are_dropped() {
        let fetcher = ok(Some("Image/WebP; charset=binary"), b"RIFF");
        let img = image_url_to_base64(&fetcher, "u").await.unwrap();
        assert_eq!(img.mime_type(), "image/webp");
    }

    #[tokio::test]
    async fn test_error_status_is_fetch_failure() {
        let fetcher = StaticFetcher(FetchedResource {
            status: 404,
            status_text: "Not Found".into(),
            content_type: Some("text/html".into()),
            body: b"<html>missing</html>".to_vec(),
        });
        let err = image_url_to_base64(&fetcher, "u").await.unwrap_err();
        assert!(matches!(err, SnapError::Fetch(_)));
        assert_eq!(err.to_string(), "Failed to fetch image: HTTP 404 Not Found");
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let err = image_url_to_base64(&FailingFetcher, "u").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to fetch image: connection refused"
        );
    }

    #[tokio::test]
    async fn test_output_decodes_to_original_bytes() {
        let body: Vec<u8> = (0..=255u8).collect();
        let img = image_url_to_base64(&ok(Some("image/bmp"), &body), "u")
            .await
            .unwrap();
        assert_eq!(img.decode().unwrap(), body);
    }

    #[test]
    fn test_check_encoded_len() {
        assert!(check_encoded_len(0, "").is_ok());
        assert!(check_encoded_len(4, "AAAAAA==").is_ok());
        assert!(matches!(
            check_encoded_len(4, "AAAA"),
            Err(SnapError::Encoding(_))
        ));
    }
}
