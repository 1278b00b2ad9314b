use chrono::{DateTime, Utc};
use std::fmt;

/// Measurement name under which every sample is stored.
pub const MEASUREMENT_NAME: &str = "weather";

/// Indexed, low-cardinality attributes of a measurement.
///
/// All three tags come from the location registry, never from the upstream
/// payload, so they stay stable regardless of upstream data quality. The
/// normalizer guarantees none of them is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementTags {
    /// Sort-prefixed display name, e.g. `a_Nashville`.
    pub location: String,
    pub country: String,
    /// Query string sent verbatim to the weather API.
    pub query_location: String,
}

/// Sampled numeric values. Everything is stored as a float to avoid
/// store-side schema collisions between integer and float writes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeasurementFields {
    pub temperature_celsius: f64,
    pub temperature_fahrenheit: f64,
    pub temperature_kelvin: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub cloudcover: f64,
    pub wind_speed_kmph: f64,
    pub visibility_km: f64,
    pub feels_like_celsius: f64,
    pub feels_like_fahrenheit: f64,
    pub latitude: f64,
    pub longitude: f64,
}

/// One normalized weather sample, ready to be written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherMeasurement {
    pub tags: MeasurementTags,
    pub fields: MeasurementFields,
    /// Wall-clock time at which the fetch completed, not the write time.
    pub timestamp: DateTime<Utc>,
}

/// Compact human-readable summary of the sampled conditions, for log lines.
impl fmt::Display for WeatherMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = &self.fields;
        write!(
            f,
            "{}°C ({}°F), feels like {}°C, humidity {}%, pressure {} hPa, \
             cloud cover {}%, wind {} km/h, visibility {} km",
            v.temperature_celsius,
            v.temperature_fahrenheit,
            v.feels_like_celsius,
            v.humidity,
            v.pressure,
            v.cloudcover,
            v.wind_speed_kmph,
            v.visibility_km,
        )
    }
}
