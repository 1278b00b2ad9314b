use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::{fmt::Debug, time::Duration};
use thiserror::Error;

/// Public wttr.in endpoint. Overridable for tests and mirrors.
pub const DEFAULT_BASE_URL: &str = "https://wttr.in";

/// Why a single fetch attempt failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection could not be established, or the attempt timed out.
    #[error("could not reach the weather API: {0}")]
    NetworkUnavailable(String),

    /// The API answered with a non-success HTTP status.
    #[error("weather API returned status {status}: {body}")]
    UpstreamError { status: u16, body: String },

    /// The body was not parseable as the expected JSON structure.
    #[error("weather API response was not valid JSON: {0}")]
    MalformedResponse(String),
}

/// Source of current-conditions reports. Seam for the retry controller and
/// the scheduler, so both can be exercised with scripted sources in tests.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn fetch_current(&self, query: &str) -> Result<WttrReport, FetchError>;
}

/// HTTP client for the wttr.in JSON API (`GET /<query>?format=j1`).
#[derive(Debug, Clone)]
pub struct WttrClient {
    http: Client,
    base_url: Url,
}

impl WttrClient {
    /// Build a client with a per-attempt request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid weather API base URL: {base_url}"))?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for the weather API")?;

        Ok(Self { http, base_url })
    }

    fn report_url(&self, query: &str) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                FetchError::NetworkUnavailable("weather API base URL does not accept a path".to_string())
            })?
            .push(query);
        Ok(url)
    }
}

#[async_trait]
impl WeatherSource for WttrClient {
    async fn fetch_current(&self, query: &str) -> Result<WttrReport, FetchError> {
        let url = self.report_url(query)?;

        let res = self
            .http
            .get(url)
            .query(&[("format", "j1")])
            .send()
            .await
            .map_err(|e| FetchError::NetworkUnavailable(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| FetchError::NetworkUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(FetchError::UpstreamError {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::MalformedResponse(e.to_string()))
    }
}

/// Raw `format=j1` payload. Every field is optional: the API may omit any of
/// them, and completeness is judged by the normalizer, not here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WttrReport {
    #[serde(default)]
    pub current_condition: Vec<CurrentCondition>,
    #[serde(default)]
    pub nearest_area: Vec<NearestArea>,
}

impl WttrReport {
    /// Free-text condition description, when the API reported one.
    pub fn description(&self) -> Option<&str> {
        self.current_condition
            .first()
            .and_then(|c| c.weather_desc.first())
            .map(|v| v.value.as_str())
    }
}

/// wttr.in reports numeric values as strings; they stay strings here and are
/// coerced by the normalizer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentCondition {
    #[serde(rename = "temp_C")]
    pub temp_c: Option<String>,
    #[serde(rename = "temp_F")]
    pub temp_f: Option<String>,
    pub humidity: Option<String>,
    pub pressure: Option<String>,
    pub cloudcover: Option<String>,
    #[serde(rename = "windspeedKmph")]
    pub windspeed_kmph: Option<String>,
    pub visibility: Option<String>,
    #[serde(rename = "FeelsLikeC")]
    pub feels_like_c: Option<String>,
    #[serde(rename = "FeelsLikeF")]
    pub feels_like_f: Option<String>,
    #[serde(rename = "winddir16Point")]
    pub winddir_16_point: Option<String>,
    #[serde(rename = "weatherDesc", default)]
    pub weather_desc: Vec<ValueEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NearestArea {
    #[serde(rename = "areaName", default)]
    pub area_name: Vec<ValueEntry>,
    #[serde(default)]
    pub country: Vec<ValueEntry>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValueEntry {
    pub value: String,
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    // Back off to a char boundary so multi-byte characters never split.
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
