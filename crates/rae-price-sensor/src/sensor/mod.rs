//! The polled price sensor: fetch, parse, resolve, then fold into state.

pub mod state;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use tracing::Instrument;

use rae_price::{parse_records, resolve, FetchOptions, Fetcher, SEARCH_WINDOW_MONTHS};

use crate::config::SensorConfig;
use crate::types::SensorResult;

pub use state::{CycleOutcome, SensorAttributes, SensorReading, SensorState, UNAVAILABLE};

/// Identifier the host registers the sensor under.
pub const SENSOR_NAME: &str = "rae_price_per_kwh";

/// Unit of the reported state.
pub const SENSOR_UNIT: &str = "EUR/kWh";

/// A pollable reading source.
#[async_trait]
pub trait Sensor: Send {
    fn name(&self) -> &str;
    fn unit(&self) -> &str;
    /// Whether the host should call [`Sensor::update`] on its own schedule.
    fn should_poll(&self) -> bool {
        true
    }
    /// Run one cycle and return the resulting reading. Never fails.
    async fn update(&mut self) -> SensorReading;
    /// Current reading without running a cycle.
    fn reading(&self) -> SensorReading;
}

/// Reports the configured provider/plan tariff in EUR/kWh.
pub struct PriceSensor {
    config: SensorConfig,
    fetcher: Fetcher,
    state: SensorState,
    span: tracing::Span,
}

impl PriceSensor {
    /// Validate the configuration and build the sensor.
    pub fn new(config: SensorConfig) -> SensorResult<Self> {
        let options = config.fetch_options();
        Self::with_options(config, options)
    }

    /// Build with explicit fetch tunables.
    pub fn with_options(config: SensorConfig, options: FetchOptions) -> SensorResult<Self> {
        config.validate()?;
        let span = tracing::info_span!(
            "sensor",
            provider = %config.provider_filter,
            plan = %config.plan_filter
        );
        let fetcher = Fetcher::new(options)?;
        let state = SensorState::new(config.precision);
        tracing::debug!(parent: &span, "sensor ready for {}", config.url);
        Ok(Self {
            config,
            fetcher,
            state,
            span,
        })
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn state(&self) -> &SensorState {
        &self.state
    }

    /// Run one cycle searching back from `reference`.
    pub async fn update_for(&mut self, reference: NaiveDate) -> SensorReading {
        let span = self.span.clone();
        let outcome = self.run_cycle(reference).instrument(span.clone()).await;
        span.in_scope(|| self.apply(&outcome, Utc::now()));
        self.reading()
    }

    /// Fetch the page and evaluate it. State is not touched.
    pub async fn run_cycle(&self, reference: NaiveDate) -> CycleOutcome {
        match self.fetcher.fetch(&self.config.url).await {
            Ok(doc) => evaluate_document(&doc.body, &self.config, reference),
            Err(e) => CycleOutcome::FetchFailed(e),
        }
    }

    /// Fold an outcome into the state, logging what happened.
    pub fn apply(&mut self, outcome: &CycleOutcome, now: DateTime<Utc>) {
        match outcome {
            CycleOutcome::Resolved(resolved) => {
                tracing::info!("Updated RAE price per kWh: EUR {:.3}", resolved.price);
            }
            CycleOutcome::NotFound => {
                tracing::warn!("no matching price in the last {SEARCH_WINDOW_MONTHS} months");
            }
            CycleOutcome::FetchFailed(e) => {
                tracing::error!("Error fetching data from RAE: {e}");
            }
            CycleOutcome::ParseFailed(e) => {
                tracing::error!("Error parsing data from RAE: {e}");
            }
        }
        self.state.apply_cycle(outcome, now);
        if !matches!(outcome, CycleOutcome::Resolved(_)) && self.state.initialized() {
            tracing::info!("keeping last good value {}", self.state.state());
        }
    }
}

#[async_trait]
impl Sensor for PriceSensor {
    fn name(&self) -> &str {
        SENSOR_NAME
    }

    fn unit(&self) -> &str {
        SENSOR_UNIT
    }

    async fn update(&mut self) -> SensorReading {
        let today = Local::now().date_naive();
        self.update_for(today).await
    }

    fn reading(&self) -> SensorReading {
        SensorReading {
            name: SENSOR_NAME.to_string(),
            unit: SENSOR_UNIT.to_string(),
            state: self.state.state().to_string(),
            attributes: SensorAttributes {
                last_found_month: self.state.last_found_month(),
                provider: self.config.provider_filter.clone(),
                plan: self.config.plan_filter.clone(),
                discounted_price: self.config.discounted_price.clone(),
                last_update: self.state.last_update(),
            },
        }
    }
}

/// Parse a fetched page and resolve the configured price.
pub fn evaluate_document(html: &str, config: &SensorConfig, reference: NaiveDate) -> CycleOutcome {
    let records = match parse_records(html) {
        Ok(records) => records,
        Err(e) => return CycleOutcome::ParseFailed(e),
    };
    match resolve(
        &records,
        &config.provider_filter,
        &config.plan_filter,
        config.variant(),
        reference,
    ) {
        Some(resolved) => CycleOutcome::Resolved(resolved),
        None => CycleOutcome::NotFound,
    }
}
