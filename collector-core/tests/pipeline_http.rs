//! Integration tests for the fetch → normalize → write pipeline against
//! mock HTTP servers (wttr.in on one side, the InfluxDB write endpoint on
//! the other).

use std::time::Duration;

use collector_core::{
    Collector, FetchError, InfluxWriter, MeasurementFields, MeasurementTags, Registry, RetryPolicy,
    WeatherMeasurement, WeatherSource, WriteError, WttrClient,
};
use collector_core::registry::LocationEntry;
use chrono::Utc;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn j1_report(area: &str, country: &str, temp_c: &str) -> serde_json::Value {
    serde_json::json!({
        "current_condition": [{
            "temp_C": temp_c,
            "temp_F": "68",
            "humidity": "55",
            "pressure": "1014",
            "cloudcover": "25",
            "windspeedKmph": "11",
            "visibility": "10",
            "FeelsLikeC": "19",
            "FeelsLikeF": "66",
            "weatherDesc": [{"value": "Partly cloudy"}]
        }],
        "nearest_area": [{
            "areaName": [{"value": area}],
            "country": [{"value": country}],
            "latitude": "48.867",
            "longitude": "2.333"
        }]
    })
}

fn test_registry(entries: &[(&str, &str, &str)]) -> Registry {
    let entries = entries.iter().map(|(name, query, country)| LocationEntry {
        name: (*name).to_string(),
        query: (*query).to_string(),
        country: (*country).to_string(),
    });
    Registry::from_entries(entries).expect("valid test registry")
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        jitter: Duration::ZERO,
    }
}

fn measurement(location: &str) -> WeatherMeasurement {
    WeatherMeasurement {
        tags: MeasurementTags {
            location: location.to_string(),
            country: "FR".to_string(),
            query_location: "Paris".to_string(),
        },
        fields: MeasurementFields { temperature_celsius: 20.0, ..MeasurementFields::default() },
        timestamp: Utc::now(),
    }
}

fn collector_for(
    wttr: &MockServer,
    influx: &MockServer,
    registry: Registry,
    max_attempts: u32,
) -> Collector {
    let source = WttrClient::new(&wttr.uri(), Duration::from_secs(2)).expect("client");
    let writer = InfluxWriter::new(&influx.uri(), "weather", "default", "test-token", Duration::from_secs(2))
        .expect("writer");

    Collector::new(
        registry,
        Box::new(source),
        writer,
        fast_retry(max_attempts),
        Duration::from_secs(30),
    )
}

#[tokio::test]
async fn fetch_parses_current_conditions() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Paris"))
        .and(query_param("format", "j1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(j1_report("Paris", "France", "20")))
        .mount(&server)
        .await;

    let client = WttrClient::new(&server.uri(), Duration::from_secs(2)).expect("client");
    let report = client.fetch_current("Paris").await.expect("fetch succeeds");

    let current = report.current_condition.first().expect("current condition");
    assert_eq!(current.temp_c.as_deref(), Some("20"));
    assert_eq!(report.description(), Some("Partly cloudy"));
}

#[tokio::test]
async fn fetch_maps_upstream_status_to_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Paris"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = WttrClient::new(&server.uri(), Duration::from_secs(2)).expect("client");
    let err = client.fetch_current("Paris").await.unwrap_err();

    assert!(matches!(err, FetchError::UpstreamError { status: 503, .. }));
}

#[tokio::test]
async fn fetch_survives_multibyte_upstream_error_bodies() {
    let server = MockServer::start().await;

    // Typographic characters straddling the truncation point of the error
    // body must still yield an UpstreamError, not a panic.
    let body = format!("{}€ server overloaded €", "x".repeat(199));
    Mock::given(method("GET"))
        .and(path("/Paris"))
        .respond_with(ResponseTemplate::new(503).set_body_string(body))
        .mount(&server)
        .await;

    let client = WttrClient::new(&server.uri(), Duration::from_secs(2)).expect("client");
    let err = client.fetch_current("Paris").await.unwrap_err();

    assert!(matches!(err, FetchError::UpstreamError { status: 503, .. }));
}

#[tokio::test]
async fn fetch_maps_bad_json_to_malformed_response() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Paris"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let client = WttrClient::new(&server.uri(), Duration::from_secs(2)).expect("client");
    let err = client.fetch_current("Paris").await.unwrap_err();

    assert!(matches!(err, FetchError::MalformedResponse(_)));
}

#[tokio::test]
async fn write_posts_line_protocol_with_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(query_param("org", "weather"))
        .and(query_param("bucket", "default"))
        .and(query_param("precision", "ns"))
        .and(wiremock::matchers::header("Authorization", "Token test-token"))
        .and(body_string_contains("weather,location=a_Paris,country=FR,query_location=Paris"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let writer =
        InfluxWriter::new(&server.uri(), "weather", "default", "test-token", Duration::from_secs(2))
            .expect("writer");

    writer.write(&measurement("a_Paris")).await.expect("write succeeds");
}

#[tokio::test]
async fn write_classifies_store_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .respond_with(ResponseTemplate::new(400).set_body_string("field type conflict"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let writer =
        InfluxWriter::new(&server.uri(), "weather", "default", "test-token", Duration::from_secs(2))
            .expect("writer");

    let err = writer.write(&measurement("a_Paris")).await.unwrap_err();
    assert!(matches!(err, WriteError::AuthRejected { status: 401 }));

    let err = writer.write(&measurement("a_Paris")).await.unwrap_err();
    assert!(matches!(err, WriteError::SchemaRejected { status: 400, .. }));

    let err = writer.write(&measurement("a_Paris")).await.unwrap_err();
    assert!(matches!(err, WriteError::StoreUnavailable { .. }));
}

/// Fetch fails twice, succeeds on the third attempt; the measurement from
/// the successful attempt reaches the store.
#[tokio::test]
async fn cycle_recovers_from_transient_fetch_failures() {
    let wttr = MockServer::start().await;
    let influx = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Paris"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&wttr)
        .await;
    Mock::given(method("GET"))
        .and(path("/Paris"))
        .respond_with(ResponseTemplate::new(200).set_body_json(j1_report("Paris", "France", "20")))
        .expect(1)
        .mount(&wttr)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(body_string_contains("location=a_Paris"))
        .and(body_string_contains("temperature_celsius=20"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&influx)
        .await;

    let registry = test_registry(&[("Paris", "Paris", "FR")]);
    let collector = collector_for(&wttr, &influx, registry, 3);

    let summary = collector.run_cycle(1).await;

    assert_eq!(summary.success, 1);
    assert_eq!(summary.retries_exhausted, 0);
    assert_eq!(summary.write_failed, 0);
}

/// Fetch fails on all attempts: the location is skipped for the cycle and
/// no write call is made, while other locations proceed normally.
#[tokio::test]
async fn cycle_skips_location_after_retries_exhausted() {
    let wttr = MockServer::start().await;
    let influx = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Paris"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&wttr)
        .await;
    Mock::given(method("GET"))
        .and(path("/Kyiv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(j1_report("Kyiv", "Ukraine", "8")))
        .expect(1)
        .mount(&wttr)
        .await;

    // Only the healthy location's measurement may arrive.
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(body_string_contains("location=b_Kyiv"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&influx)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(body_string_contains("location=a_Paris"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&influx)
        .await;

    let registry = test_registry(&[("Paris", "Paris", "FR"), ("Kyiv", "Kyiv", "UA")]);
    let collector = collector_for(&wttr, &influx, registry, 3);

    let summary = collector.run_cycle(1).await;

    assert_eq!(summary.success, 1);
    assert_eq!(summary.retries_exhausted, 1);
    assert_eq!(summary.write_failed, 0);
}

/// A write failure for one location does not block the other location's
/// pipeline in the same cycle, and the next cycle still attempts writes
/// with the same (known-bad) credential.
#[tokio::test]
async fn write_failures_stay_contained_per_location() {
    let wttr = MockServer::start().await;
    let influx = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Paris"))
        .respond_with(ResponseTemplate::new(200).set_body_json(j1_report("Paris", "France", "20")))
        .expect(2)
        .mount(&wttr)
        .await;
    Mock::given(method("GET"))
        .and(path("/Kyiv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(j1_report("Kyiv", "Ukraine", "8")))
        .expect(2)
        .mount(&wttr)
        .await;

    // Paris writes are rejected as unauthorized; Kyiv writes succeed.
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(body_string_contains("location=a_Paris"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .expect(2)
        .mount(&influx)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(body_string_contains("location=b_Kyiv"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&influx)
        .await;

    let registry = test_registry(&[("Paris", "Paris", "FR"), ("Kyiv", "Kyiv", "UA")]);
    let collector = collector_for(&wttr, &influx, registry, 3);

    let first = collector.run_cycle(1).await;
    assert_eq!(first.success, 1);
    assert_eq!(first.write_failed, 1);

    // The daemon does not self-heal credentials, but it keeps going.
    let second = collector.run_cycle(2).await;
    assert_eq!(second.success, 1);
    assert_eq!(second.write_failed, 1);
}

/// The trait seam also works with a scripted source; retries never leak
/// into the store when the source keeps failing.
#[derive(Debug)]
struct DownSource;

#[async_trait::async_trait]
impl WeatherSource for DownSource {
    async fn fetch_current(
        &self,
        _query: &str,
    ) -> Result<collector_core::WttrReport, FetchError> {
        Err(FetchError::NetworkUnavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn scripted_source_counts_exhaustion_for_every_location() {
    let influx = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&influx)
        .await;

    let writer =
        InfluxWriter::new(&influx.uri(), "weather", "default", "test-token", Duration::from_secs(2))
            .expect("writer");
    let registry = test_registry(&[("Paris", "Paris", "FR"), ("Kyiv", "Kyiv", "UA")]);

    let collector = Collector::new(
        registry,
        Box::new(DownSource),
        writer,
        fast_retry(2),
        Duration::from_secs(30),
    );

    let summary = collector.run_cycle(1).await;

    assert_eq!(summary.success, 0);
    assert_eq!(summary.retries_exhausted, 2);
    assert_eq!(summary.write_failed, 0);
}
