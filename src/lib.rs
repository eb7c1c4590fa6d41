//! Image ⇄ Base64 toolkit.
//!
//! Sniffs image types from Base64 prefixes, converts remote images into
//! `{base64, mimeType}` pairs, keeps a bounded history of recently rendered
//! images, and runs a litter check on the newest photo in a Supabase bucket.

pub mod config;
pub mod error;
pub mod fetch;
pub mod history;
pub mod image_utils;
pub mod logging;
pub mod payload;
pub mod photo_bucket;
pub mod pipeline;
pub mod vision;
#[cfg(feature = "web")]
pub mod web;
