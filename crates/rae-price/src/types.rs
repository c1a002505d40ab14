//! Core data types for tariff records and resolved prices.

use serde::{Deserialize, Serialize};

/// Source values are quoted per megawatt-hour; readings are per kilowatt-hour.
pub const KWH_PER_MWH: f64 = 1000.0;

/// One row of the published tariff table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub provider: String,
    /// Only the attribute-tagged layout carries a year column.
    pub year: Option<String>,
    /// Month number as text, `"1"` through `"12"`.
    pub month: String,
    pub plan: String,
    /// Raw standard price text, per MWh.
    pub standard_price: Option<String>,
    /// Raw discounted price text, per MWh.
    pub discounted_price: Option<String>,
}

impl PriceRecord {
    /// Raw text of the requested price column.
    pub fn price_text(&self, variant: PriceVariant) -> Option<&str> {
        match variant {
            PriceVariant::Standard => self.standard_price.as_deref(),
            PriceVariant::Discounted => self.discounted_price.as_deref(),
        }
    }

    /// Parse the requested price column into a per-MWh value.
    pub fn price_per_mwh(&self, variant: PriceVariant) -> PriceResult<f64> {
        let raw = self.price_text(variant).ok_or_else(|| PriceError::Value {
            raw: String::new(),
        })?;
        parse_decimal(raw).ok_or_else(|| PriceError::Value {
            raw: raw.to_string(),
        })
    }
}

/// Which price column a lookup reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceVariant {
    Standard,
    Discounted,
}

impl PriceVariant {
    /// Map the `"Y"`/other configuration flag onto a variant.
    pub fn from_flag(flag: &str) -> Self {
        if flag == "Y" {
            PriceVariant::Discounted
        } else {
            PriceVariant::Standard
        }
    }

    pub fn is_discounted(self) -> bool {
        self == PriceVariant::Discounted
    }
}

/// Outcome of a successful search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    /// EUR/kWh.
    pub price: f64,
    /// Month (1-12) of the record that matched.
    pub month_found: u32,
}

/// Parse a price cell into a number.
///
/// Accepts surrounding whitespace, a euro sign, and either `.` or `,` as the
/// decimal separator. When both appear, the later one is the decimal mark.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('€')
        .trim_end_matches('€')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Errors that can occur while acquiring or interpreting the tariff page.
#[derive(thiserror::Error, Debug)]
pub enum PriceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Bot challenge not passed ({body_len} bytes served)")]
    Challenge { body_len: usize },

    #[error("Data marker not found ({body_len} bytes served)")]
    MarkerNotFound { body_len: usize },

    #[error("No known tariff table layout in document")]
    UnknownLayout,

    #[error("Non-numeric price value: {raw:?}")]
    Value { raw: String },

    #[error("Cookie jar error: {0}")]
    CookieJar(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type PriceResult<T> = Result<T, PriceError>;
