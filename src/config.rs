//! Backend Configuration
//!
//! Compile-time defaults from the build environment, overridable at runtime
//! through a `window.__BOOKMARKS_CONFIG__` object set by the hosting page.

use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use wasm_bindgen::JsValue;

const WINDOW_KEY: &str = "__BOOKMARKS_CONFIG__";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("backend URL is not configured")]
    MissingUrl,

    #[error("backend anon key is not configured")]
    MissingAnonKey,

    #[error("backend URL must be an absolute http(s) URL: {0}")]
    InvalidUrl(String),

    #[error("callback path must start with '/': {0}")]
    InvalidCallbackPath(String),

    #[error("unknown log level: {0}")]
    InvalidLogLevel(String),

    #[error("malformed runtime config: {0}")]
    Malformed(String),
}

/// Hosted backend connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Public anon key sent as `apikey`
    pub anon_key: String,
    /// OAuth provider used by the sign-in button
    pub provider: String,
    /// Path the identity provider redirects back to
    pub callback_path: String,
    pub request_timeout_ms: u64,
    pub log_level: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: option_env!("BOOKMARKS_BACKEND_URL").unwrap_or_default().to_string(),
            anon_key: option_env!("BOOKMARKS_ANON_KEY").unwrap_or_default().to_string(),
            provider: "google".to_string(),
            callback_path: "/auth/callback".to_string(),
            request_timeout_ms: 10_000,
            log_level: "info".to_string(),
        }
    }
}

impl BackendConfig {
    /// Build defaults, apply the page override, validate
    pub fn load() -> Result<Self, ConfigError> {
        let config = match Self::window_override()? {
            Some(config) => config,
            None => Self::default(),
        };
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    fn window_override() -> Result<Option<Self>, ConfigError> {
        let Some(window) = web_sys::window() else {
            return Ok(None);
        };
        let value = js_sys::Reflect::get(&window, &JsValue::from_str(WINDOW_KEY))
            .map_err(|e| ConfigError::Malformed(format!("{:?}", e)))?;
        if value.is_undefined() || value.is_null() {
            return Ok(None);
        }
        serde_wasm_bindgen::from_value(value)
            .map(Some)
            .map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    pub fn normalized(mut self) -> Self {
        self.url = self.url.trim().trim_end_matches('/').to_string();
        self.anon_key = self.anon_key.trim().to_string();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if self.anon_key.is_empty() {
            return Err(ConfigError::MissingAnonKey);
        }
        match Url::parse(&self.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base() => {}
            _ => return Err(ConfigError::InvalidUrl(self.url.clone())),
        }
        if !self.callback_path.starts_with('/') {
            return Err(ConfigError::InvalidCallbackPath(self.callback_path.clone()));
        }
        self.log_filter()?;
        Ok(())
    }

    pub fn log_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `{url}/rest/v1/{table}`
    pub fn rest_url(&self, table: &str) -> Result<Url, ConfigError> {
        self.endpoint(&["rest", "v1", table])
    }

    /// `{url}/auth/v1/{path}`
    pub fn auth_url(&self, path: &str) -> Result<Url, ConfigError> {
        self.endpoint(&["auth", "v1", path])
    }

    /// Realtime websocket endpoint, `ws(s)://` matching the backend scheme
    pub fn realtime_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.endpoint(&["realtime", "v1", "websocket"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| ConfigError::InvalidUrl(self.url.clone()))?;
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ConfigError> {
        let invalid = || ConfigError::InvalidUrl(self.url.clone());
        let mut url = Url::parse(&self.url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
