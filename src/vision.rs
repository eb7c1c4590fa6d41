// ---------------------------------------------------------------------------
// Gemini generateContent provider
//
// Endpoint:
//   POST {base_url}/models/{model}:generateContent
//
// Authentication: x-goog-api-key header
// ---------------------------------------------------------------------------

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::SnapError;
use crate::image_utils::EncodedImage;
use crate::payload::{build_payload_url, find_base64_image};

const ANALYZE_PROMPT: &str = "Analyze the content of this image in detail. Provide a descriptive analysis, identifying objects, settings, potential themes, and any notable visual elements.";

const TRASH_PROMPT: &str = "Analyze this image. Does it contain any trash or litter? Does it contain a plastic bottle? Answer only in the requested JSON format.";

/// Structured answer of the litter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashCheck {
    pub has_trash: bool,
    pub has_plastic_bottle: bool,
}

#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Free-form description of the image.
    async fn analyze_image(&self, image: &EncodedImage) -> Result<String, SnapError>;

    /// Whether the image shows litter and/or a plastic bottle.
    async fn check_for_trash_and_bottle(
        &self,
        image: &EncodedImage,
    ) -> Result<TrashCheck, SnapError>;

    /// Plain text completion, no image attached.
    async fn complete_text(&self, prompt: &str) -> Result<String, SnapError>;
}

// ---------------------------------------------------------------------------
// Request / response translation
// ---------------------------------------------------------------------------

fn image_part(image: &EncodedImage) -> serde_json::Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type(),
            "data": image.base64(),
        }
    })
}

fn trash_response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "hasTrash": {
                "type": "BOOLEAN",
                "description": "Is there any trash or litter visible in the image?",
            },
            "hasPlasticBottle": {
                "type": "BOOLEAN",
                "description": "Is there a plastic bottle visible in the image?",
            },
        },
        "required": ["hasTrash", "hasPlasticBottle"],
    })
}

fn build_request_body(
    parts: Vec<serde_json::Value>,
    response_schema: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": parts }],
    });
    if let Some(schema) = response_schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }
    body
}

/// Concatenate the text parts of the first candidate.
fn extract_text(body: &serde_json::Value) -> Result<String, String> {
    let parts = body
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array());

    let Some(parts) = parts else {
        if let Some(reason) = body
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
        {
            return Err(format!("request was blocked ({reason})"));
        }
        return Err("response contained no candidates".into());
    };

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err("response contained no text".into());
    }
    Ok(text)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop a language tag such as `json` on the opening fence line.
    match inner.split_once('\n') {
        Some((tag, rest)) if !tag.trim().contains(char::is_whitespace) => rest.trim(),
        _ => inner.trim(),
    }
}

fn parse_trash_check(text: &str) -> Result<TrashCheck, String> {
    serde_json::from_str(strip_code_fence(text)).map_err(|e| format!("malformed response: {e}"))
}

fn upstream_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
}

// ---------------------------------------------------------------------------
// GeminiClient
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, SnapError> {
        config.validate_for_vision()?;
        Ok(GeminiClient {
            http: reqwest::Client::new(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }

    async fn generate(&self, body: serde_json::Value) -> Result<String, String> {
        let response = self
            .http
            .post(self.generate_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let err_body = response.text().await.unwrap_or_default();
            let message = upstream_error_message(&err_body).unwrap_or(err_body);
            return Err(format!("Gemini HTTP {status}: {message}"));
        }

        let value: serde_json::Value = response.json().await.map_err(|e| e.to_string())?;
        extract_text(&value)
    }
}

#[async_trait]
impl ImageClassifier for GeminiClient {
    async fn analyze_image(&self, image: &EncodedImage) -> Result<String, SnapError> {
        let body = build_request_body(
            vec![image_part(image), json!({ "text": ANALYZE_PROMPT })],
            None,
        );
        self.generate(body).await.map_err(|e| {
            error!(error = %e, "image analysis failed");
            SnapError::Classification(format!("Failed to analyze image: {e}"))
        })
    }

    async fn check_for_trash_and_bottle(
        &self,
        image: &EncodedImage,
    ) -> Result<TrashCheck, SnapError> {
        let body = build_request_body(
            vec![image_part(image), json!({ "text": TRASH_PROMPT })],
            Some(trash_response_schema()),
        );
        let result = match self.generate(body).await {
            Ok(text) => parse_trash_check(&text),
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            error!(error = %e, "trash check failed");
            SnapError::Classification(format!("Failed to perform AI check: {e}"))
        })
    }

    async fn complete_text(&self, prompt: &str) -> Result<String, SnapError> {
        let body = build_request_body(vec![json!({ "text": prompt })], None);
        self.generate(body).await.map_err(|e| {
            error!(error = %e, "text generation failed");
            SnapError::Classification(format!("Failed to generate URL: {e}"))
        })
    }
}

/// Build a payload URL for the image embedded in a code snippet.
///
/// A Base64 run with a known image signature is extracted locally. Only when
/// none is found is the model asked to locate the string.
pub async fn generate_api_url(
    classifier: &dyn ImageClassifier,
    snippet: &str,
    location: &str,
) -> Result<String, SnapError> {
    if snippet.trim().is_empty() {
        return Err(SnapError::InvalidPayload(
            "Please enter some code to analyze.".into(),
        ));
    }

    if let Some(image) = find_base64_image(snippet) {
        debug!(mime_type = image.mime_type(), "found embedded image locally");
        return Ok(build_payload_url(location, image.base64()));
    }

    let target = location.split(['#', '?']).next().unwrap_or(location);
    let prompt = format!(
        "You are a code generation assistant. The user will provide a code snippet.\n\
         Your task is to find the Base64 string within it. After finding the Base64 string, you must URL-encode it.\n\
         Finally, construct a complete URL using the following template:\n\n\
         {target}#b64=[URL-encoded_Base64_string]\n\n\
         Only return the final, complete URL and nothing else. Do not add any explanation, code fences, or extra text.\n\n\
         User's code snippet:\n---\n{snippet}\n---\n"
    );
    let reply = classifier.complete_text(&prompt).await?;
    Ok(strip_code_fence(&reply).to_string())
}
