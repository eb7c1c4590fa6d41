//! Base64 images carried inside URLs and pasted text.
//!
//! A payload URL looks like `https://host/path#b64=<url-encoded base64>`.
//! Nothing here reads ambient state: the current location is always passed in.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::SnapError;
use crate::image_utils::{detect_mime_type, EncodedImage};

pub const PAYLOAD_PARAM: &str = "b64";

/// Pull the raw `b64` value out of a location's fragment, falling back to its
/// query string. Percent-escapes are decoded; `+` is kept as a literal plus.
pub fn extract_b64_param(location: &str) -> Result<Option<String>, SnapError> {
    let (before_fragment, fragment) = match location.split_once('#') {
        Some((head, frag)) => (head, Some(frag)),
        None => (location, None),
    };
    let query = before_fragment.split_once('?').map(|(_, q)| q);

    let raw = fragment
        .and_then(find_param)
        .or_else(|| query.and_then(find_param));
    let Some(raw) = raw else {
        return Ok(None);
    };

    let decoded = urlencoding::decode(raw).map_err(|e| {
        SnapError::InvalidPayload(format!(
            "Failed to parse the Base64 data from the URL: {e}"
        ))
    })?;
    Ok(Some(decoded.into_owned()))
}

fn find_param(params: &str) -> Option<&str> {
    params.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == PAYLOAD_PARAM).then_some(value)
    })
}

/// Interpret a payload URL.
///
/// `Ok(None)` means there is nothing to render (no fragment, no `b64`
/// parameter, or a blank value). A present payload must carry a known image
/// signature.
pub fn parse_payload_url(location: &str) -> Result<Option<EncodedImage>, SnapError> {
    let Some(value) = extract_b64_param(location)? else {
        return Ok(None);
    };
    let value = strip_whitespace(&value);
    if value.is_empty() {
        return Ok(None);
    }
    EncodedImage::sniffed(value).map(Some)
}

/// Build a payload URL for `base64` rooted at `location`'s origin and path.
pub fn build_payload_url(location: &str, base64: &str) -> String {
    let base = location
        .split(['#', '?'])
        .next()
        .unwrap_or(location);
    format!(
        "{base}#{PAYLOAD_PARAM}={}",
        urlencoding::encode(base64.trim())
    )
}

/// Turn pasted text into an image: either a full `data:image/...` URL, or a
/// bare Base64 string whose type is sniffed.
pub fn normalize_pasted(input: &str) -> Result<EncodedImage, SnapError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SnapError::InvalidPayload(
            "Please paste a Base64 string.".into(),
        ));
    }
    if trimmed.starts_with("data:image/") {
        return EncodedImage::from_data_url(trimmed);
    }
    EncodedImage::sniffed(strip_whitespace(trimmed))
}

fn strip_whitespace(input: &str) -> String {
    input.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}

fn base64_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9+/]{16,}={0,2}").expect("base64 run regex is valid")
    })
}

/// Closing quote, whitespace, opening quote: the seam between adjacent string
/// literals that C and Arduino sources concatenate at compile time.
fn literal_seam_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""\s*""#).expect("literal seam regex is valid"))
}

/// Find the longest Base64 run in a code snippet that starts with a known
/// image signature and decodes cleanly.
///
/// Adjacent string literals are joined first, so an image split over several
/// lines of `"..."` is found whole.
pub fn find_base64_image(snippet: &str) -> Option<EncodedImage> {
    let joined = literal_seam_regex().replace_all(snippet, "");
    base64_run_regex()
        .find_iter(&joined)
        .map(|m| m.as_str())
        .filter(|run| detect_mime_type(run).is_some())
        .max_by_key(|run| run.len())
        .and_then(|run| EncodedImage::sniffed(run).ok())
        .filter(|image| image.decode().is_ok())
}
