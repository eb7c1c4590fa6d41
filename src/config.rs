use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SnapError;

fn default_bucket() -> String {
    "polyBitePhoto".into()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".into()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

fn default_history_path() -> String {
    "./snapb64.data/history.json".into()
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".into()
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Supabase project, e.g. `https://xyz.supabase.co`.
    #[serde(default)]
    pub supabase_url: String,
    #[serde(default)]
    pub supabase_key: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default)]
    pub gemini_api_key: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// JSON file backing the recent-image history.
    #[serde(default = "default_history_path")]
    pub history_path: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Per-request timeout for image downloads. Unset means no timeout.
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// File this config was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            supabase_url: String::new(),
            supabase_key: String::new(),
            bucket: default_bucket(),
            gemini_api_key: String::new(),
            gemini_model: default_gemini_model(),
            gemini_base_url: default_gemini_base_url(),
            history_path: default_history_path(),
            listen_addr: default_listen_addr(),
            fetch_timeout_secs: None,
            log_level: default_log_level(),
            source: None,
        }
    }
}

impl Config {
    /// Load config from `SNAPB64_CONFIG`, then `snapb64.config.yaml` / `.yml`
    /// in the working directory, falling back to defaults. Secrets missing
    /// from the file are picked up from the environment.
    ///
    /// Runs before logging is installed; see [`Config::log_source`].
    pub fn load() -> Result<Self, SnapError> {
        let mut config = match resolve_config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, SnapError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SnapError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml_str(&raw)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn log_source(&self) {
        match &self.source {
            Some(path) => info!(path = %path.display(), "loaded config"),
            None => debug!("no config file found, using defaults"),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, SnapError> {
        serde_yaml::from_str(raw)
            .map_err(|e| SnapError::Config(format!("Failed to parse config: {e}")))
    }

    fn apply_env_overrides(&mut self) {
        fill_from_env(&mut self.supabase_url, &["SUPABASE_URL"]);
        fill_from_env(&mut self.supabase_key, &["SUPABASE_KEY"]);
        fill_from_env(&mut self.gemini_api_key, &["GEMINI_API_KEY", "API_KEY"]);
    }

    /// Both remote services are needed for the photo check.
    pub fn validate_for_check(&self) -> Result<(), SnapError> {
        self.validate_for_listing()?;
        self.validate_for_vision()
    }

    pub fn validate_for_listing(&self) -> Result<(), SnapError> {
        if self.supabase_url.trim().is_empty() {
            return Err(SnapError::Config(
                "supabase_url is not set (config file or SUPABASE_URL)".into(),
            ));
        }
        if self.supabase_key.trim().is_empty() {
            return Err(SnapError::Config(
                "supabase_key is not set (config file or SUPABASE_KEY)".into(),
            ));
        }
        Ok(())
    }

    pub fn validate_for_vision(&self) -> Result<(), SnapError> {
        if self.gemini_api_key.trim().is_empty() {
            return Err(SnapError::Config(
                "gemini_api_key is not set (config file, GEMINI_API_KEY or API_KEY)".into(),
            ));
        }
        Ok(())
    }

    pub fn list_url(&self) -> String {
        format!(
            "{}/storage/v1/object/list/{}",
            self.supabase_url.trim_end_matches('/'),
            self.bucket
        )
    }

    pub fn public_url_prefix(&self) -> String {
        format!(
            "{}/storage/v1/object/public/{}/",
            self.supabase_url.trim_end_matches('/'),
            self.bucket
        )
    }
}

fn fill_from_env(field: &mut String, vars: &[&str]) {
    if !field.trim().is_empty() {
        return;
    }
    if let Some(value) = vars
        .iter()
        .filter_map(|v| std::env::var(v).ok())
        .find(|v| !v.trim().is_empty())
    {
        *field = value;
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(from_env) = std::env::var("SNAPB64_CONFIG") {
        if !from_env.trim().is_empty() {
            return Some(PathBuf::from(from_env));
        }
    }

    ["snapb64.config.yaml", "snapb64.config.yml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
