//! Polling sensor that reports the RAE tariff price in EUR/kWh.

pub mod config;
pub mod poller;
pub mod sensor;
pub mod types;

pub use config::{resolve_cookie_jar_path, resolve_poll_interval, SensorConfig};
pub use sensor::{PriceSensor, Sensor, SensorReading, SensorState};
pub use types::{SensorError, SensorResult};
