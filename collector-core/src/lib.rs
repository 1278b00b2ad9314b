//! Core library for the weather collection daemon.
//!
//! This crate defines:
//! - The location registry and runtime configuration
//! - The wttr.in fetcher with its retry/backoff controller
//! - Normalization into the fixed measurement schema
//! - The InfluxDB write path and the periodic scheduler
//!
//! It is used by `collector-daemon`, but can also be reused by other
//! binaries or services.

pub mod config;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod write;

pub use config::Settings;
pub use fetch::{FetchError, WeatherSource, WttrClient, WttrReport};
pub use model::{MeasurementFields, MeasurementTags, WeatherMeasurement};
pub use normalize::{NormalizeError, normalize};
pub use registry::{LocationSpec, Registry};
pub use retry::{RetriesExhausted, RetryPolicy, with_retry};
pub use scheduler::{Collector, CycleOutcome, CycleSummary};
pub use write::{InfluxWriter, WriteError};
