//! Sticky last-known-good sensor state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rae_price::{PriceError, ResolvedPrice};

/// State reported before any cycle has succeeded.
pub const UNAVAILABLE: &str = "Unavailable";

/// Result of one fetch, parse and resolve pass.
#[derive(Debug)]
pub enum CycleOutcome {
    Resolved(ResolvedPrice),
    NotFound,
    FetchFailed(PriceError),
    ParseFailed(PriceError),
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Resolved(_) => "resolved",
            CycleOutcome::NotFound => "not_found",
            CycleOutcome::FetchFailed(_) => "fetch_failed",
            CycleOutcome::ParseFailed(_) => "parse_failed",
        }
    }
}

/// Extra attributes published with the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorAttributes {
    pub last_found_month: Option<u32>,
    pub provider: String,
    pub plan: String,
    pub discounted_price: String,
    pub last_update: Option<DateTime<Utc>>,
}

/// What the host reads back after each poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub name: String,
    pub unit: String,
    pub state: String,
    pub attributes: SensorAttributes,
}

/// Value and metadata carried across cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    state: String,
    initialized: bool,
    price: Option<f64>,
    last_found_month: Option<u32>,
    last_update: Option<DateTime<Utc>>,
    precision: usize,
}

impl SensorState {
    pub fn new(precision: usize) -> Self {
        Self {
            state: UNAVAILABLE.to_string(),
            initialized: false,
            price: None,
            last_found_month: None,
            last_update: None,
            precision,
        }
    }

    /// Fold one cycle into the state.
    ///
    /// A resolved price replaces the value. Any other outcome keeps the last
    /// good value once one exists, and leaves the state at [`UNAVAILABLE`]
    /// otherwise.
    pub fn apply_cycle(&mut self, outcome: &CycleOutcome, now: DateTime<Utc>) {
        match outcome {
            CycleOutcome::Resolved(resolved) => {
                self.state = format!("{:.*}", self.precision, resolved.price);
                self.price = Some(resolved.price);
                self.initialized = true;
                self.last_found_month = Some(resolved.month_found);
                self.last_update = Some(now);
            }
            _ if self.initialized => {}
            _ => {
                self.state = UNAVAILABLE.to_string();
            }
        }
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// Last resolved price in EUR/kWh, unrounded.
    pub fn price(&self) -> Option<f64> {
        self.price
    }

    pub fn last_found_month(&self) -> Option<u32> {
        self.last_found_month
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }
}
