//! Integration tests for whole update cycles against a local mock server.
//!
//! Exercises the sticky last-good-value behaviour across fetch failures,
//! missing data, and layout changes between polls.

use std::time::Duration;

use chrono::NaiveDate;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rae_price::FetchOptions;
use rae_price_sensor::sensor::{PriceSensor, Sensor, UNAVAILABLE};
use rae_price_sensor::SensorConfig;

// ─────────────────────── helpers ───────────────────────

const HEADER_PAGE: &str = r#"<html><body>
<table id="billing_table">
  <tr><th>Πάροχος</th><th>Έτος</th><th>Μήνας</th><th>Ονομασία Τιμολογίου</th>
      <th>Τελική Τιμή Προμήθειας (€/MWh)</th><th>Τελική Τιμή Προμήθειας με Έκπτωση (€/MWh)</th></tr>
  <tr><td>ACME</td><td>2026</td><td>9</td><td>Basic</td><td>150.4</td><td>130,25</td></tr>
  <tr><td>Volt</td><td>2026</td><td>10</td><td>Basic</td><td>170</td><td>160</td></tr>
</table>
</body></html>"#;

const TAGGED_PAGE: &str = r#"<html><body><table>
<tr data-invoice-id="1">
  <td>ACME</td><td>2026</td><td>10</td><td>Basic</td>
  <td class="price standard">140</td><td class="price discounted">120</td>
</tr>
</table></body></html>"#;

fn config(server: &MockServer, discounted: &str) -> SensorConfig {
    SensorConfig {
        provider_filter: "ACME".to_string(),
        plan_filter: "Basic".to_string(),
        url: format!("{}/prices", server.uri()),
        discounted_price: discounted.to_string(),
        ..SensorConfig::default()
    }
}

fn fast_options() -> FetchOptions {
    FetchOptions {
        timeout: Duration::from_secs(5),
        backoff_base: Duration::from_millis(1),
        navigation_delay_min: Duration::ZERO,
        navigation_delay_max: Duration::ZERO,
        challenge_cooldown: Duration::ZERO,
        cookie_jar_path: None,
        ..FetchOptions::default()
    }
}

fn october() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

async fn mount_root(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>home</html>"))
        .mount(server)
        .await;
}

async fn mount_prices(server: &MockServer, status: u16, body: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path("/prices"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

// ═══════════════════════════════════════════════════════
// FIRST CYCLE
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_first_cycle_resolves_with_fallback_month() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    mount_prices(&server, 200, HEADER_PAGE, 1).await;

    let mut sensor = PriceSensor::with_options(config(&server, "N"), fast_options()).unwrap();
    let reading = sensor.update_for(october()).await;

    assert_eq!(reading.name, "rae_price_per_kwh");
    assert_eq!(reading.unit, "EUR/kWh");
    assert_eq!(reading.state, "0.150");
    assert_eq!(reading.attributes.last_found_month, Some(9));
    assert_eq!(reading.attributes.provider, "ACME");
    assert_eq!(reading.attributes.plan, "Basic");
    assert_eq!(reading.attributes.discounted_price, "N");
    assert!(reading.attributes.last_update.is_some());
    assert!(sensor.state().initialized());
}

#[tokio::test]
async fn test_discounted_comma_decimal() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    mount_prices(&server, 200, HEADER_PAGE, 1).await;

    let mut cfg = config(&server, "Y");
    cfg.precision = 5;
    let mut sensor = PriceSensor::with_options(cfg, fast_options()).unwrap();
    let reading = sensor.update_for(october()).await;
    assert_eq!(reading.state, "0.13025");
}

#[tokio::test]
async fn test_first_cycle_failure_is_unavailable() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    mount_prices(&server, 404, "gone", 1).await;

    let mut sensor = PriceSensor::with_options(config(&server, "Y"), fast_options()).unwrap();
    let reading = sensor.update_for(october()).await;

    assert_eq!(reading.state, UNAVAILABLE);
    assert_eq!(reading.attributes.last_found_month, None);
    assert_eq!(reading.attributes.last_update, None);
    assert!(!sensor.state().initialized());
}

#[tokio::test]
async fn test_no_match_is_unavailable() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    mount_prices(&server, 200, HEADER_PAGE, 1).await;

    let mut cfg = config(&server, "Y");
    cfg.plan_filter = "Premium".to_string();
    let mut sensor = PriceSensor::with_options(cfg, fast_options()).unwrap();
    let reading = sensor.update_for(october()).await;
    assert_eq!(reading.state, UNAVAILABLE);
}

// ═══════════════════════════════════════════════════════
// STICKY STATE
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_fetch_failure_keeps_last_good_reading() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    mount_prices(&server, 200, HEADER_PAGE, 1).await;
    mount_prices(&server, 500, "boom", 3).await;

    let mut sensor = PriceSensor::with_options(config(&server, "N"), fast_options()).unwrap();
    let first = sensor.update_for(october()).await;
    assert_eq!(first.state, "0.150");

    let second = sensor.update_for(october()).await;
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_unrecognized_page_keeps_last_good_reading() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    mount_prices(&server, 200, TAGGED_PAGE, 1).await;
    mount_prices(&server, 200, "<html>we are redesigning</html>", 1).await;

    let mut sensor = PriceSensor::with_options(config(&server, "Y"), fast_options()).unwrap();
    let first = sensor.update_for(october()).await;
    assert_eq!(first.state, "0.120");
    assert_eq!(first.attributes.last_found_month, Some(10));

    let second = sensor.update_for(october()).await;
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_not_found_keeps_last_good_reading() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    mount_prices(&server, 200, TAGGED_PAGE, 1).await;
    mount_prices(&server, 200, &TAGGED_PAGE.replace("ACME", "Volt"), 1).await;

    let mut sensor = PriceSensor::with_options(config(&server, "Y"), fast_options()).unwrap();
    let first = sensor.update_for(october()).await;
    assert_eq!(first.state, "0.120");

    let later = NaiveDate::from_ymd_opt(2026, 11, 2).unwrap();
    let second = sensor.update_for(later).await;
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_layout_change_between_polls() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    mount_prices(&server, 200, HEADER_PAGE, 1).await;
    mount_prices(&server, 200, TAGGED_PAGE, 1).await;

    let mut sensor = PriceSensor::with_options(config(&server, "Y"), fast_options()).unwrap();
    let first = sensor.update_for(october()).await;
    assert_eq!(first.state, "0.130");
    assert_eq!(first.attributes.last_found_month, Some(9));

    let second = sensor.update_for(october()).await;
    assert_eq!(second.state, "0.120");
    assert_eq!(second.attributes.last_found_month, Some(10));
}

#[tokio::test]
async fn test_trait_update_uses_today() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    mount_prices(&server, 503, "busy", 3).await;

    let mut sensor = PriceSensor::with_options(config(&server, "Y"), fast_options()).unwrap();
    let reading = sensor.update().await;
    assert_eq!(reading.state, UNAVAILABLE);
}
