//! Fixed-interval polling, standing in for the host scheduler.
//!
//! One cycle runs to completion before the next tick is awaited, so cycles
//! never overlap. Missed ticks are delayed rather than bunched.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::sensor::{Sensor, SensorReading};

/// Poll `sensor` every `interval` until `shutdown` is notified.
///
/// The first cycle runs immediately. Each reading is handed to `on_reading`.
/// Returns the number of cycles run.
pub async fn run<S, F>(
    sensor: &mut S,
    interval: Duration,
    shutdown: Arc<Notify>,
    mut on_reading: F,
) -> u64
where
    S: Sensor + ?Sized,
    F: FnMut(&SensorReading),
{
    if !sensor.should_poll() {
        tracing::info!("{} does not poll, running a single cycle", sensor.name());
        let reading = sensor.update().await;
        on_reading(&reading);
        return 1;
    }

    tracing::info!(
        "poll loop started: sensor={} interval={}s",
        sensor.name(),
        interval.as_secs()
    );
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycles: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.notified() => {
                tracing::info!("poll loop stopping after {cycles} cycle(s)");
                break;
            }
            _ = ticker.tick() => {
                cycles = cycles.saturating_add(1);
                let reading = sensor.update().await;
                tracing::debug!("cycle {cycles}: state={}", reading.state);
                on_reading(&reading);
            }
        }
    }

    cycles
}
