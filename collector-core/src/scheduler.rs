//! Periodic collection driver.
//!
//! Each cycle fans out one independent pipeline per registered location
//! (fetch with retries, normalize, write) and joins them all before logging
//! the cycle summary. A cycle therefore never overlaps the previous one;
//! stragglers delay the next tick instead of racing it.

use anyhow::Result;
use chrono::Utc;
use futures::future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Settings,
    fetch::{WeatherSource, WttrClient},
    normalize::normalize,
    registry::{LocationSpec, Registry},
    retry::{RetryPolicy, with_retry},
    write::{InfluxWriter, WriteError},
};

/// Result of one location's pipeline within one cycle. Logging only; never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Success,
    RetriesExhausted,
    WriteFailed,
}

/// Per-cycle outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub success: usize,
    pub retries_exhausted: usize,
    pub write_failed: usize,
}

impl CycleSummary {
    fn record(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Success => self.success += 1,
            CycleOutcome::RetriesExhausted => self.retries_exhausted += 1,
            CycleOutcome::WriteFailed => self.write_failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.retries_exhausted + self.write_failed
    }
}

/// Owns the registry and the fetch/write collaborators and drives the
/// collection loop.
pub struct Collector {
    registry: Registry,
    source: Box<dyn WeatherSource>,
    writer: InfluxWriter,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl Collector {
    pub fn new(
        registry: Registry,
        source: Box<dyn WeatherSource>,
        writer: InfluxWriter,
        retry: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self { registry, source, writer, retry, poll_interval }
    }

    /// Wire up the real wttr.in client and InfluxDB writer from settings.
    pub fn from_settings(settings: &Settings, registry: Registry) -> Result<Self> {
        let source = WttrClient::new(&settings.wttr_base_url, settings.fetch_timeout())?;
        let writer = InfluxWriter::new(
            &settings.influx_url,
            &settings.influx_org,
            &settings.influx_bucket,
            &settings.influx_token,
            settings.write_timeout(),
        )?;

        Ok(Self::new(
            registry,
            Box::new(source),
            writer,
            settings.retry_policy(),
            settings.poll_interval(),
        ))
    }

    /// Run cycles at the configured interval until `shutdown` is cancelled.
    /// An in-flight cycle always finishes; cancellation only stops new ones.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle = 0u64;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!(cycles = cycle, "collector stopping; no new cycles will start");
                    return;
                }
                _ = ticker.tick() => {}
            }

            cycle += 1;
            self.run_cycle(cycle).await;
        }
    }

    /// Execute one pass over all locations and log the aggregate outcome.
    pub async fn run_cycle(&self, cycle: u64) -> CycleSummary {
        tracing::debug!(cycle, locations = self.registry.len(), "cycle starting");

        let pipelines = self
            .registry
            .locations()
            .iter()
            .map(|location| self.process_location(location));
        let outcomes = future::join_all(pipelines).await;

        let mut summary = CycleSummary::default();
        for outcome in outcomes {
            summary.record(outcome);
        }

        if summary.success == 0 && summary.total() > 0 {
            tracing::error!(
                cycle,
                retries_exhausted = summary.retries_exhausted,
                write_failed = summary.write_failed,
                "cycle produced no successful measurements"
            );
        } else {
            tracing::info!(
                cycle,
                success = summary.success,
                retries_exhausted = summary.retries_exhausted,
                write_failed = summary.write_failed,
                "cycle complete"
            );
        }

        summary
    }

    /// One location's pipeline: fetch with retries, normalize, write. Every
    /// failure is contained here and reported as an outcome.
    async fn process_location(&self, location: &LocationSpec) -> CycleOutcome {
        let report = match with_retry(&self.retry, || self.source.fetch_current(&location.query)).await
        {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(
                    location = %location.display_name,
                    error = %err,
                    "skipping location for this cycle"
                );
                return CycleOutcome::RetriesExhausted;
            }
        };

        let observed_at = Utc::now();

        let measurement = match normalize(&report, location, observed_at) {
            Ok(measurement) => measurement,
            Err(err) => {
                tracing::error!(
                    location = %location.display_name,
                    error = %err,
                    "measurement dropped before write"
                );
                return CycleOutcome::WriteFailed;
            }
        };

        tracing::debug!(
            location = %location.display_name,
            description = report.description().unwrap_or("n/a"),
            conditions = %measurement,
            "current conditions"
        );

        match self.writer.write(&measurement).await {
            Ok(()) => {
                tracing::debug!(location = %location.display_name, "measurement written");
                CycleOutcome::Success
            }
            Err(err @ WriteError::AuthRejected { .. }) => {
                // Distinct alert: every location will keep failing until the
                // credential is replaced externally.
                tracing::error!(
                    location = %location.display_name,
                    error = %err,
                    "write credential rejected; all writes will fail until it is rotated"
                );
                CycleOutcome::WriteFailed
            }
            Err(err) => {
                tracing::warn!(
                    location = %location.display_name,
                    error = %err,
                    "write failed"
                );
                CycleOutcome::WriteFailed
            }
        }
    }
}
