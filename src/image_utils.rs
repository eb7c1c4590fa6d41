//! Base64 and MIME helpers shared by the converter, the payload parser and
//! the history cache.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::SnapError;

/// Fallback type when nothing authoritative is known about fetched bytes.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Known Base64 prefixes, checked in order. First match wins.
const BASE64_SIGNATURES: &[(&str, &str)] = &[
    ("/9j/", "image/jpeg"),
    ("iVBOR", "image/png"),
    ("R0lGO", "image/gif"),
    ("UklGR", "image/webp"),
    ("PHN2Zw", "image/svg+xml"),
    ("Qk0=", "image/bmp"),
];

/// Accepts both padded and unpadded input on decode.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Map the start of a Base64 string to an image MIME type.
///
/// Returns `None` for anything not in the signature table, including empty
/// input. Inputs shorter than six characters may miss the longer signatures.
pub fn detect_mime_type(prefix: &str) -> Option<&'static str> {
    BASE64_SIGNATURES
        .iter()
        .find(|(sig, _)| prefix.starts_with(sig))
        .map(|(_, mime)| *mime)
}

/// Guess the MIME type of an image from its raw magic bytes.
pub fn guess_image_media_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"GIF8") {
        Some("image/gif")
    } else if data.starts_with(b"RIFF") && data.len() >= 12 && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else if data.starts_with(b"<svg") {
        Some("image/svg+xml")
    } else if data.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

/// Base64-encode raw bytes: standard alphabet, padded, no line breaks.
pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard-alphabet Base64, with or without trailing padding.
pub fn base64_decode(encoded: &str) -> Result<Vec<u8>, SnapError> {
    LENIENT
        .decode(encoded.trim())
        .map_err(|e| SnapError::InvalidPayload(format!("Invalid Base64 data: {e}")))
}

/// A Base64 payload together with its media type.
///
/// Fields are private so a value cannot be altered after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    base64: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

impl EncodedImage {
    /// Build from an authoritative MIME type (e.g. an HTTP `Content-Type`).
    /// The type is trusted as given.
    pub fn new(base64: impl Into<String>, mime_type: impl Into<String>) -> Self {
        EncodedImage {
            base64: base64.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Build from a bare Base64 string, deriving the type by sniffing.
    pub fn sniffed(base64: impl Into<String>) -> Result<Self, SnapError> {
        let base64 = base64.into();
        let mime_type = detect_mime_type(&base64).ok_or(SnapError::UnrecognizedFormat)?;
        Ok(EncodedImage::new(base64, mime_type))
    }

    pub fn from_bytes(data: &[u8], mime_type: impl Into<String>) -> Self {
        EncodedImage::new(base64_encode(data), mime_type)
    }

    /// Parse `data:<mime>;base64,<payload>`.
    pub fn from_data_url(url: &str) -> Result<Self, SnapError> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| SnapError::InvalidPayload("Not a data URL.".into()))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| SnapError::InvalidPayload("Data URL has no payload.".into()))?;
        let mime_type = meta.strip_suffix(";base64").ok_or_else(|| {
            SnapError::InvalidPayload("Only Base64 data URLs are supported.".into())
        })?;
        let mime_type = if mime_type.is_empty() {
            OCTET_STREAM
        } else {
            mime_type
        };
        Ok(EncodedImage::new(payload, mime_type))
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    pub fn decode(&self) -> Result<Vec<u8>, SnapError> {
        base64_decode(&self.base64)
    }

    pub fn into_parts(self) -> (String, String) {
        (self.base64, self.mime_type)
    }
}

/// Map an image MIME type to a file extension for writing decoded output.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}
