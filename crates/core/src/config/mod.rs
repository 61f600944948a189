//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TUBEGUIDE_*)
//! 2. TOML config file (if TUBEGUIDE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// How the page is being run; decides how a pending update is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Installed application: updates are applied silently with a reload.
    Standalone,
    /// Regular browser tab: updates wait for the user to accept a prompt.
    #[default]
    Browser,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TUBEGUIDE_*)
/// 2. TOML config file (if TUBEGUIDE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite database holding cache generations and page storage.
    ///
    /// Set via TUBEGUIDE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the page is served from; manifest paths resolve against it.
    ///
    /// Set via TUBEGUIDE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Version tag of the deployed controller. Change it to invalidate caches.
    ///
    /// Set via TUBEGUIDE_VERSION_TAG environment variable.
    #[serde(default = "default_version_tag")]
    pub version_tag: String,

    /// Assets that must be cached before a version counts as installed.
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    /// Document served for failed navigations with nothing cached.
    #[serde(default = "default_offline_path")]
    pub offline_path: String,

    /// Dataset of analysis records, fetched through the controller.
    #[serde(default = "default_dataset_path")]
    pub dataset_path: String,

    /// Activate a freshly installed version without waiting for pages to close.
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,

    /// Whether the page runs as an installed app or in a browser tab.
    #[serde(default)]
    pub display_mode: DisplayMode,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via TUBEGUIDE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via TUBEGUIDE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Number of recent searches kept.
    #[serde(default = "default_history_max")]
    pub history_max: usize,

    /// Days before a recent search expires.
    #[serde(default = "default_history_ttl_days")]
    pub history_ttl_days: i64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tubeguide.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080/".into()
}

fn default_version_tag() -> String {
    "tubeguide-cache-v3".into()
}

fn default_manifest() -> Vec<String> {
    ["./", "./index.html", "./style.css", "./app.js", "./data.json", "./manifest.json", "./offline.html"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_offline_path() -> String {
    "./offline.html".into()
}

fn default_dataset_path() -> String {
    "./data.json".into()
}

fn default_user_agent() -> String {
    "tubeguide/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_history_max() -> usize {
    8
}

fn default_history_ttl_days() -> i64 {
    7
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            version_tag: default_version_tag(),
            manifest: default_manifest(),
            offline_path: default_offline_path(),
            dataset_path: default_dataset_path(),
            skip_waiting_on_install: true,
            display_mode: DisplayMode::default(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            history_max: default_history_max(),
            history_ttl_days: default_history_ttl_days(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed origin URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin is not an http(s) URL.
    pub fn origin_url(&self) -> Result<url::Url, ConfigError> {
        let parsed = url::Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme {scheme}") }),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TUBEGUIDE_`
    /// 2. TOML file from `TUBEGUIDE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed,
    /// or if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TUBEGUIDE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TUBEGUIDE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
