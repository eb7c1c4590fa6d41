//! HTTP surface for devices that poll the latest litter check.
//!
//! `GET /api/check` answers with the [`CheckResponse`] JSON envelope. CORS is
//! wide open so microcontrollers and browser pages on any origin can call it.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use tracing::info;

use crate::error::SnapError;
use crate::fetch::ByteFetcher;
use crate::photo_bucket::PhotoLister;
use crate::pipeline::{run_check, CheckResponse};
use crate::vision::ImageClassifier;

const CORS_HEADERS: [(HeaderName, &str); 4] = [
    (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"),
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET,OPTIONS"),
    (
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        "X-CSRF-Token, X-Requested-With, Accept, Accept-Version, Content-Length, Content-MD5, Content-Type, Date, X-Api-Version",
    ),
];

const EDGE_CACHE_CONTROL: &str = "s-maxage=60, stale-while-revalidate=120";

pub struct WebState {
    pub lister: Arc<dyn PhotoLister>,
    pub fetcher: Arc<dyn ByteFetcher>,
    pub classifier: Arc<dyn ImageClassifier>,
}

pub fn router(state: Arc<WebState>) -> Router {
    Router::new()
        .route("/api/check", any(check_handler))
        .with_state(state)
}

pub async fn serve(listen_addr: &str, state: Arc<WebState>) -> Result<(), SnapError> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(addr = %listener.local_addr()?, "check endpoint listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn check_handler(method: Method, State(state): State<Arc<WebState>>) -> Response {
    if method == Method::OPTIONS {
        return (StatusCode::OK, CORS_HEADERS).into_response();
    }

    if method != Method::GET {
        let body =
            CheckResponse::failure(format!("Method {method} Not Allowed"), chrono::Utc::now());
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            CORS_HEADERS,
            [(header::ALLOW, "GET")],
            Json(body),
        )
            .into_response();
    }

    let result = run_check(
        state.lister.as_ref(),
        state.fetcher.as_ref(),
        state.classifier.as_ref(),
    )
    .await;
    let body = CheckResponse::from_result(result, chrono::Utc::now());

    if body.is_success() {
        (
            StatusCode::OK,
            CORS_HEADERS,
            [(header::CACHE_CONTROL, EDGE_CACHE_CONTROL)],
            Json(body),
        )
            .into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, CORS_HEADERS, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchedResource;
    use crate::image_utils::EncodedImage;
    use crate::photo_bucket::StoredFile;
    use crate::vision::TrashCheck;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct Bucket(Vec<StoredFile>);

    #[async_trait]
    impl PhotoLister for Bucket {
        async fn list_recent(&self, _limit: usize) -> Result<Vec<StoredFile>, SnapError> {
            Ok(self.0.clone())
        }
        fn public_url_prefix(&self) -> String {
            "https://cdn.test/cam/".into()
        }
    }

    struct JpegFetcher;

    #[async_trait]
    impl ByteFetcher for JpegFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedResource, SnapError> {
            Ok(FetchedResource {
                status: 200,
                status_text: "OK".into(),
                content_type: Some("image/jpeg".into()),
                body: vec![0xFF, 0xD8, 0xFF, 0xE0],
            })
        }
    }

    struct AlwaysTrash;

    #[async_trait]
    impl ImageClassifier for AlwaysTrash {
        async fn analyze_image(&self, _image: &EncodedImage) -> Result<String, SnapError> {
            Ok("trash".into())
        }
        async fn check_for_trash_and_bottle(
            &self,
            image: &EncodedImage,
        ) -> Result<TrashCheck, SnapError> {
            assert_eq!(image.mime_type(), "image/jpeg");
            Ok(TrashCheck {
                has_trash: true,
                has_plastic_bottle: true,
            })
        }
        async fn complete_text(&self, _prompt: &str) -> Result<String, SnapError> {
            Ok(String::new())
        }
    }

    fn app(files: Vec<StoredFile>) -> Router {
        router(Arc::new(WebState {
            lister: Arc::new(Bucket(files)),
            fetcher: Arc::new(JpegFetcher),
            classifier: Arc::new(AlwaysTrash),
        }))
    }

    async fn call(app: Router, method: Method) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/api/check")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }

    #[tokio::test]
    async fn test_get_success() {
        let (status, headers, json) =
            call(app(vec![StoredFile::new("c.jpg", "2024-01-03")]), Method::GET).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::CACHE_CONTROL], EDGE_CACHE_CONTROL);
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"]["photoUrl"], "https://cdn.test/cam/c.jpg");
        assert_eq!(json["data"]["analysis"]["hasPlasticBottle"], true);
    }

    #[tokio::test]
    async fn test_get_failure_is_500() {
        let (status, headers, json) = call(app(vec![]), Method::GET).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(headers.get(header::CACHE_CONTROL).is_none());
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "No photos found in the collection.");
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let (status, headers, json) = call(app(vec![]), Method::OPTIONS).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET,OPTIONS");
        assert!(json.is_null());
    }

    #[tokio::test]
    async fn test_post_not_allowed() {
        let (status, headers, json) = call(app(vec![]), Method::POST).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers[header::ALLOW], "GET");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "Method POST Not Allowed");
        assert!(json.get("data").is_none());
    }
}
