//! Maps a raw wttr.in report into the fixed measurement schema.
//!
//! Pure and deterministic: identical report + location + observation time
//! always produce the identical measurement.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    fetch::WttrReport,
    model::{MeasurementFields, MeasurementTags, WeatherMeasurement},
    registry::LocationSpec,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// A mandatory tag source is empty. The record must not be written.
    #[error("mandatory tag `{0}` is empty")]
    MissingMandatoryTag(&'static str),
}

/// Build a measurement from a raw report.
///
/// Non-mandatory values missing from the report default to 0.0 rather than
/// failing the record. Units are taken as upstream supplies them; nothing is
/// re-derived, so a unit variant the API does not report (e.g. Kelvin) keeps
/// its default.
pub fn normalize(
    report: &WttrReport,
    location: &LocationSpec,
    observed_at: DateTime<Utc>,
) -> Result<WeatherMeasurement, NormalizeError> {
    let tags = MeasurementTags {
        location: mandatory_tag("location", &location.display_name)?,
        country: mandatory_tag("country", &location.country)?,
        query_location: mandatory_tag("query_location", &location.query)?,
    };

    let current = report.current_condition.first();
    let area = report.nearest_area.first();

    let fields = MeasurementFields {
        temperature_celsius: numeric_field(current.and_then(|c| c.temp_c.as_deref())),
        temperature_fahrenheit: numeric_field(current.and_then(|c| c.temp_f.as_deref())),
        // wttr.in does not report Kelvin; the field stays at its default.
        temperature_kelvin: numeric_field(None),
        humidity: numeric_field(current.and_then(|c| c.humidity.as_deref())),
        pressure: numeric_field(current.and_then(|c| c.pressure.as_deref())),
        cloudcover: numeric_field(current.and_then(|c| c.cloudcover.as_deref())),
        wind_speed_kmph: numeric_field(current.and_then(|c| c.windspeed_kmph.as_deref())),
        visibility_km: numeric_field(current.and_then(|c| c.visibility.as_deref())),
        feels_like_celsius: numeric_field(current.and_then(|c| c.feels_like_c.as_deref())),
        feels_like_fahrenheit: numeric_field(current.and_then(|c| c.feels_like_f.as_deref())),
        latitude: numeric_field(area.and_then(|a| a.latitude.as_deref())),
        longitude: numeric_field(area.and_then(|a| a.longitude.as_deref())),
    };

    Ok(WeatherMeasurement { tags, fields, timestamp: observed_at })
}

fn mandatory_tag(name: &'static str, value: &str) -> Result<String, NormalizeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::MissingMandatoryTag(name));
    }
    Ok(trimmed.to_string())
}

/// Coerce an upstream string value to a float. Absent, unparseable or
/// non-finite values all map to the documented default of 0.0.
fn numeric_field(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
