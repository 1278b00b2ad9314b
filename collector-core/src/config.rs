use anyhow::{Context, Result, bail};
use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::{fetch, retry};

/// Default locations of the env file left behind by the one-shot token
/// extraction step.
const TOKEN_FILE_CANDIDATES: &[&str] = &["/workspace/extracted_token", "/tmp/extracted_token"];

const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Immutable runtime configuration, read once from the environment at
/// startup and passed explicitly into constructors.
#[derive(Debug, Clone)]
pub struct Settings {
    pub influx_url: String,
    pub influx_org: String,
    pub influx_bucket: String,
    pub influx_token: String,
    pub wttr_base_url: String,
    pub poll_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub locations_file: Option<PathBuf>,
    pub debug: bool,
}

impl Settings {
    /// Read settings from the process environment (plus `.env`, if present).
    ///
    /// A missing or empty write credential is a startup error; there is no
    /// runtime path for acquiring one later.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let influx_token = resolve_token().context(
            "No InfluxDB credential available; set INFLUXDB_TOKEN or INFLUXDB_TOKEN_FILE",
        )?;

        Ok(Self {
            influx_url: env_or("INFLUXDB_URL", "http://localhost:8086"),
            influx_org: env_or("INFLUXDB_ORG", "weather"),
            influx_bucket: env_or("INFLUXDB_BUCKET", "default"),
            influx_token,
            wttr_base_url: env_or("WTTR_BASE_URL", fetch::DEFAULT_BASE_URL),
            poll_interval_secs: env_parse("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            fetch_timeout_secs: env_parse("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?,
            write_timeout_secs: env_parse("WRITE_TIMEOUT_SECS", DEFAULT_WRITE_TIMEOUT_SECS)?,
            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", retry::DEFAULT_MAX_ATTEMPTS)?,
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", retry::DEFAULT_BASE_DELAY_MS)?,
            retry_max_delay_ms: env_parse("RETRY_MAX_DELAY_MS", retry::DEFAULT_MAX_DELAY_MS)?,
            locations_file: env::var("LOCATIONS_FILE")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            debug: parse_bool(&env_or("DEBUG", "")),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> retry::RetryPolicy {
        retry::RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            ..retry::RetryPolicy::default()
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        _ => Ok(default),
    }
}

/// Truthy values accepted for the debug toggle.
pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Resolve the write credential: the environment first, then the extracted
/// token env file.
fn resolve_token() -> Result<String> {
    if let Ok(token) = env::var("INFLUXDB_TOKEN") {
        let token = token.trim();
        if !token.is_empty() {
            return Ok(token.to_string());
        }
    }

    if let Ok(path) = env::var("INFLUXDB_TOKEN_FILE") {
        let path = PathBuf::from(path.trim());
        return read_token_file(&path);
    }

    for candidate in TOKEN_FILE_CANDIDATES {
        let path = Path::new(candidate);
        if path.exists() {
            return read_token_file(path);
        }
    }

    bail!("no credential in INFLUXDB_TOKEN and no token file found")
}

/// Parse an extracted-token env file, looking for an `INFLUXDB_TOKEN=` line.
pub fn read_token_file(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read token file: {}", path.display()))?;

    for line in contents.lines() {
        if let Some(value) = line.trim().strip_prefix("INFLUXDB_TOKEN=") {
            let value = value.trim();
            if value.is_empty() {
                break;
            }
            return Ok(value.to_string());
        }
    }

    bail!("INFLUXDB_TOKEN not found in token file: {}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_truthy_debug_values() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn reads_token_from_env_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "# extracted by the bootstrap step").expect("write");
        writeln!(file, "INFLUXDB_TOKEN=secret-token-value").expect("write");

        let token = read_token_file(file.path()).expect("token present");
        assert_eq!(token, "secret-token-value");
    }

    #[test]
    fn rejects_token_file_without_token_line() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "SOMETHING_ELSE=1").expect("write");

        let err = read_token_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("INFLUXDB_TOKEN not found"));
    }

    #[test]
    fn rejects_token_file_with_empty_value() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "INFLUXDB_TOKEN=").expect("write");

        let err = read_token_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("INFLUXDB_TOKEN not found"));
    }

    #[test]
    fn duration_accessors_floor_at_one_second() {
        let settings = Settings {
            influx_url: "http://localhost:8086".into(),
            influx_org: "weather".into(),
            influx_bucket: "default".into(),
            influx_token: "t".into(),
            wttr_base_url: fetch::DEFAULT_BASE_URL.into(),
            poll_interval_secs: 0,
            fetch_timeout_secs: 0,
            write_timeout_secs: 45,
            retry_max_attempts: 0,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
            locations_file: None,
            debug: false,
        };

        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
        assert_eq!(settings.fetch_timeout(), Duration::from_secs(1));
        assert_eq!(settings.write_timeout(), Duration::from_secs(45));

        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_millis(8_000));
    }
}
