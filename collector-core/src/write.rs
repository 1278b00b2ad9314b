use anyhow::{Context, Result};
use reqwest::{
    Client, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use std::time::Duration;
use thiserror::Error;

use crate::model::{MEASUREMENT_NAME, WeatherMeasurement};

/// Why a single store write failed.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Credential invalid or expired. Every subsequent write will fail the
    /// same way until the credential is replaced externally.
    #[error("store rejected the write credential (status {status})")]
    AuthRejected { status: u16 },

    /// Connection failure, timeout, or a server-side error.
    #[error("store unavailable: {detail}")]
    StoreUnavailable { detail: String },

    /// Store-side validation failure, e.g. a type mismatch with a
    /// previously-written field of the same name.
    #[error("store rejected the measurement (status {status}): {detail}")]
    SchemaRejected { status: u16, detail: String },
}

/// Writes measurements to an InfluxDB v2 `/api/v2/write` endpoint, one line
/// of line protocol per call. No batching and no retries here; retry policy
/// belongs to the caller.
#[derive(Debug, Clone)]
pub struct InfluxWriter {
    http: Client,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl InfluxWriter {
    pub fn new(
        url: &str,
        org: &str,
        bucket: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for the store")?;

        Ok(Self {
            http,
            write_url: format!("{}/api/v2/write", url.trim_end_matches('/')),
            org: org.to_string(),
            bucket: bucket.to_string(),
            token: token.to_string(),
        })
    }

    /// Commit one measurement. Exactly one outbound call per invocation.
    pub async fn write(&self, measurement: &WeatherMeasurement) -> Result<(), WriteError> {
        let line = line_protocol(measurement);

        let res = self
            .http
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await
            .map_err(|e| WriteError::StoreUnavailable { detail: e.to_string() })?;

        let status = res.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = res.text().await.unwrap_or_default();
        Err(classify_status(status, detail))
    }
}

fn classify_status(status: StatusCode, detail: String) -> WriteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            WriteError::AuthRejected { status: status.as_u16() }
        }
        s if s.is_client_error() && s != StatusCode::TOO_MANY_REQUESTS => {
            WriteError::SchemaRejected { status: s.as_u16(), detail }
        }
        s => WriteError::StoreUnavailable { detail: format!("status {s}: {detail}") },
    }
}

/// Render one measurement as an InfluxDB line-protocol line with a
/// nanosecond timestamp. All field values are written as floats.
pub fn line_protocol(m: &WeatherMeasurement) -> String {
    let f = &m.fields;
    let timestamp_ns = m.timestamp.timestamp_nanos_opt().unwrap_or_default();

    format!(
        "{measurement},location={location},country={country},query_location={query} \
         temperature_celsius={tc},temperature_fahrenheit={tf},temperature_kelvin={tk},\
         humidity={hum},pressure={pres},cloudcover={cc},wind_speed_kmph={wind},\
         visibility_km={vis},feels_like_celsius={flc},feels_like_fahrenheit={flf},\
         latitude={lat},longitude={lon} {timestamp_ns}",
        measurement = MEASUREMENT_NAME,
        location = escape_tag_value(&m.tags.location),
        country = escape_tag_value(&m.tags.country),
        query = escape_tag_value(&m.tags.query_location),
        tc = f.temperature_celsius,
        tf = f.temperature_fahrenheit,
        tk = f.temperature_kelvin,
        hum = f.humidity,
        pres = f.pressure,
        cc = f.cloudcover,
        wind = f.wind_speed_kmph,
        vis = f.visibility_km,
        flc = f.feels_like_celsius,
        flf = f.feels_like_fahrenheit,
        lat = f.latitude,
        lon = f.longitude,
    )
}

/// Escape the characters line protocol reserves inside tag values.
fn escape_tag_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(' ', "\\ ")
        .replace(',', "\\,")
        .replace('=', "\\=")
}
