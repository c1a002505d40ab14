//! Configuration loading, validation, and path resolution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rae_price::{FetchOptions, PriceVariant};

use crate::types::{SensorError, SensorResult};

/// File name of the cookie jar when no path is configured.
pub const DEFAULT_COOKIE_JAR_FILE: &str = "rae_price_cookies.json";

/// Poll interval when neither the flag nor `RAE_POLL_SECS` is set.
pub const DEFAULT_POLL_SECS: u64 = 3600;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PRECISION: usize = 3;

/// Sensor configuration as supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub provider_filter: String,
    pub plan_filter: String,
    pub url: String,
    /// `"Y"` reads the discounted price; anything else the standard one.
    #[serde(default = "default_discounted")]
    pub discounted_price: String,
    /// Decimal places in the reported state, 3 or 5.
    #[serde(default = "default_precision")]
    pub precision: usize,
    #[serde(default)]
    pub cookie_jar: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_discounted() -> String {
    "Y".to_string()
}

fn default_precision() -> usize {
    DEFAULT_PRECISION
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            provider_filter: String::new(),
            plan_filter: String::new(),
            url: String::new(),
            discounted_price: default_discounted(),
            precision: DEFAULT_PRECISION,
            cookie_jar: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SensorConfig {
    /// Read a JSON configuration file. The result is not yet validated.
    pub fn from_file(path: &Path) -> SensorResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Check required fields, the URL, and display precision.
    pub fn validate(&self) -> SensorResult<()> {
        if self.provider_filter.trim().is_empty() {
            return Err(SensorError::MissingField("provider_filter"));
        }
        if self.plan_filter.trim().is_empty() {
            return Err(SensorError::MissingField("plan_filter"));
        }
        if self.url.trim().is_empty() {
            return Err(SensorError::MissingField("url"));
        }

        let parsed = url::Url::parse(&self.url)
            .map_err(|e| SensorError::InvalidUrl(format!("{}: {e}", self.url)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(SensorError::InvalidUrl(format!(
                "{}: expected an http(s) URL with a host",
                self.url
            )));
        }

        if !matches!(self.precision, 3 | 5) {
            return Err(SensorError::InvalidPrecision(self.precision));
        }
        if self.timeout_secs == 0 {
            return Err(SensorError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn variant(&self) -> PriceVariant {
        PriceVariant::from_flag(&self.discounted_price)
    }

    /// Fetch tunables derived from this configuration.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            cookie_jar_path: Some(resolve_cookie_jar_path(self.cookie_jar.as_deref())),
            ..FetchOptions::default()
        }
    }
}

/// Resolve the cookie jar path.
///
/// Explicit path, then `RAE_COOKIE_JAR`, then a file beside the running
/// executable, then the current directory.
pub fn resolve_cookie_jar_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var("RAE_COOKIE_JAR") {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }

    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_COOKIE_JAR_FILE)
}

/// Resolve the poll interval: explicit seconds, then `RAE_POLL_SECS`, then the default.
pub fn resolve_poll_interval(explicit: Option<u64>) -> Duration {
    let secs = explicit.unwrap_or_else(|| read_env_u64("RAE_POLL_SECS", DEFAULT_POLL_SECS));
    Duration::from_secs(secs.max(1))
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
