use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use collector_core::{Collector, Registry, Settings};

/// How long an in-flight cycle may keep running after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-collectord", version, about = "Collects weather samples into InfluxDB")]
pub struct Cli {
    /// Run exactly one collection cycle and exit.
    #[arg(long)]
    pub once: bool,

    /// Override the polling interval in seconds.
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Force debug-level logging.
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut settings = Settings::from_env().context("Failed to load configuration")?;
        if let Some(secs) = self.interval_secs {
            settings.poll_interval_secs = secs;
        }
        if self.debug {
            settings.debug = true;
        }

        init_tracing(settings.debug)?;

        let registry = match &settings.locations_file {
            Some(path) => Registry::from_toml_path(path)?,
            None => Registry::with_defaults(),
        };

        tracing::info!(
            locations = registry.len(),
            store_url = %settings.influx_url,
            org = %settings.influx_org,
            bucket = %settings.influx_bucket,
            interval_secs = settings.poll_interval().as_secs(),
            "starting weather collector"
        );

        let collector = Collector::from_settings(&settings, registry)
            .context("Failed to build the collector")?;

        if self.once {
            let summary = collector.run_cycle(1).await;
            tracing::info!(
                success = summary.success,
                retries_exhausted = summary.retries_exhausted,
                write_failed = summary.write_failed,
                "single cycle finished"
            );
            return Ok(());
        }

        let shutdown = CancellationToken::new();
        let run_token = shutdown.clone();
        let mut run_handle = tokio::spawn(async move { collector.run(run_token).await });

        tokio::select! {
            res = &mut run_handle => {
                res.context("collector task failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
                if tokio::time::timeout(SHUTDOWN_GRACE, &mut run_handle).await.is_err() {
                    tracing::warn!(
                        grace_secs = SHUTDOWN_GRACE.as_secs(),
                        "grace period elapsed; aborting in-flight cycle"
                    );
                    run_handle.abort();
                }
            }
        }

        Ok(())
    }
}

fn init_tracing(debug: bool) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_filter = if debug { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}
