//! rae-price-sensor entry point.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio::sync::Notify;

use rae_price::{parse_records, resolve, TableLayout};
use rae_price_sensor::config::{resolve_cookie_jar_path, resolve_poll_interval, SensorConfig};
use rae_price_sensor::poller;
use rae_price_sensor::sensor::{PriceSensor, Sensor};

#[derive(Parser)]
#[command(
    name = "rae-price-sensor",
    about = "Polling sensor for the RAE electricity tariff price in EUR/kWh",
    version
)]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Provider name as it appears in the tariff table.
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Tariff plan name as it appears in the tariff table.
    #[arg(long, global = true)]
    plan: Option<String>,

    /// URL of the tariff page.
    #[arg(long, global = true)]
    url: Option<String>,

    /// "Y" for the discounted price, anything else for the standard price.
    #[arg(long, global = true)]
    discounted: Option<String>,

    /// Decimal places in the reported state (3 or 5).
    #[arg(long, global = true)]
    precision: Option<usize>,

    /// Path of the persisted cookie jar.
    #[arg(long, global = true)]
    cookie_jar: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll on a fixed interval, printing one JSON reading per line (default).
    Run {
        /// Seconds between cycles. Also reads RAE_POLL_SECS.
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run a single cycle and print the reading.
    Once,

    /// Parse a saved tariff page and show what the sensor would report.
    Inspect {
        /// Saved HTML file.
        html: PathBuf,

        /// Reference date (YYYY-MM-DD) for the month search. Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Validate the configuration and print it.
    Validate,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

impl Cli {
    /// Configuration file values with command-line flags applied on top.
    fn load_config(&self) -> anyhow::Result<SensorConfig> {
        let mut config = match &self.config {
            Some(path) => SensorConfig::from_file(path)?,
            None => SensorConfig::default(),
        };
        if let Some(provider) = &self.provider {
            config.provider_filter = provider.clone();
        }
        if let Some(plan) = &self.plan {
            config.plan_filter = plan.clone();
        }
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(discounted) = &self.discounted {
            config.discounted_price = discounted.clone();
        }
        if let Some(precision) = self.precision {
            config.precision = precision;
        }
        if let Some(cookie_jar) = &self.cookie_jar {
            config.cookie_jar = Some(cookie_jar.clone());
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        None => run_poll(&cli, None).await?,

        Some(Commands::Run { interval }) => run_poll(&cli, *interval).await?,

        Some(Commands::Once) => {
            let config = cli.load_config()?;
            let mut sensor = PriceSensor::new(config)?;
            let reading = sensor.update().await;
            println!("{}", serde_json::to_string_pretty(&reading)?);
        }

        Some(Commands::Inspect { html, date }) => {
            let config = cli.load_config()?;
            let body = std::fs::read_to_string(html)?;
            let reference = date.unwrap_or_else(|| Local::now().date_naive());

            let layout = TableLayout::detect(&body);
            let records = parse_records(&body).unwrap_or_default();
            let resolved = resolve(
                &records,
                &config.provider_filter,
                &config.plan_filter,
                config.variant(),
                reference,
            );

            let info = serde_json::json!({
                "layout": layout.map(|l| l.name()),
                "record_count": records.len(),
                "records": records,
                "reference_date": reference,
                "resolved": resolved,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Some(Commands::Validate) => {
            let config = cli.load_config()?;
            let cookie_jar = resolve_cookie_jar_path(config.cookie_jar.as_deref());
            println!("Valid configuration");
            println!("  Provider:   {}", config.provider_filter);
            println!("  Plan:       {}", config.plan_filter);
            println!("  URL:        {}", config.url);
            println!("  Price:      {:?}", config.variant());
            println!("  Precision:  {}", config.precision);
            println!("  Timeout:    {}s", config.timeout_secs);
            println!("  Cookie jar: {}", cookie_jar.display());
        }

        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "rae-price-sensor", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Poll until interrupted, printing each reading as a JSON line.
async fn run_poll(cli: &Cli, interval: Option<u64>) -> anyhow::Result<()> {
    let config = cli.load_config()?;
    let mut sensor = PriceSensor::new(config)?;

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            signal.notify_one();
        }
    });

    poller::run(&mut sensor, resolve_poll_interval(interval), shutdown, |reading| {
        match serde_json::to_string(reading) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!("could not serialize reading: {e}"),
        }
    })
    .await;

    Ok(())
}
