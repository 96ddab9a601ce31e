use std::{fs, net::SocketAddr, time::Duration};

use gesbox_client::domain::TimeBucket;
use serde::Deserialize;
use time::{macros::format_description, UtcOffset};

use crate::{aggregate::CumulativePolicy, sources::Endpoint};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Published CSV (or other single-byte delimited) export.
    #[default]
    Delimited,
    /// Spreadsheet API JSON rows envelope.
    Structured,
}

/// Export column names for each reading field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnMapping {
    #[serde(default = "default_device_column")]
    pub device_id: Option<String>,
    #[serde(default = "default_volume_column")]
    pub volume: String,
    #[serde(default = "default_cumulative_column")]
    pub cumulative_volume: Option<String>,
    #[serde(default = "default_timestamp_column")]
    pub timestamp: String,
}

fn default_device_column() -> Option<String> {
    Some("gesBoxId".to_string())
}

fn default_volume_column() -> String {
    "volume".to_string()
}

fn default_cumulative_column() -> Option<String> {
    Some("volume_cumule".to_string())
}

fn default_timestamp_column() -> String {
    "timestamp".to_string()
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            device_id: default_device_column(),
            volume: default_volume_column(),
            cumulative_volume: default_cumulative_column(),
            timestamp: default_timestamp_column(),
        }
    }
}

impl ColumnMapping {
    /// An empty name unmaps the column.
    pub fn device_column(&self) -> Option<&str> {
        self.device_id.as_deref().filter(|c| !c.is_empty())
    }

    pub fn cumulative_column(&self) -> Option<&str> {
        self.cumulative_volume.as_deref().filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    pub endpoints: Vec<Endpoint>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub cumulative: CumulativePolicy,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub columns: ColumnMapping,
}

fn default_delimiter() -> String {
    ",".to_string()
}

impl SourceConfig {
    /// Only valid after `AppConfig::validate`.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter.as_bytes().first().copied().unwrap_or(b',')
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_addr")]
    pub bind_addr: String,
    /// `+HH:MM` / `-HH:MM`; dates in the history view and naive source dates
    /// use this offset.
    #[serde(default = "default_display_offset")]
    pub display_offset: String,
    #[serde(default)]
    pub default_bucket: TimeBucket,
}

fn default_dashboard_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_display_offset() -> String {
    "+00:00".to_string()
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_dashboard_addr(),
            display_offset: default_display_offset(),
            default_bucket: TimeBucket::default(),
        }
    }
}

impl DashboardConfig {
    pub fn offset(&self) -> Result<UtcOffset, ConfigError> {
        parse_offset(&self.display_offset)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    pub metrics: Option<MetricsConfig>,
}

pub fn parse_offset(s: &str) -> Result<UtcOffset, ConfigError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s.eq_ignore_ascii_case("z") {
        return Ok(UtcOffset::UTC);
    }
    UtcOffset::parse(s, format_description!("[offset_hour sign:mandatory]:[offset_minute]"))
        .map_err(|e| ConfigError::Invalid(format!("display_offset '{s}': {e}")))
}

fn parse_addr(field: &str, s: &str) -> Result<SocketAddr, ConfigError> {
    s.parse()
        .map_err(|e| ConfigError::Invalid(format!("{field} '{s}': {e}")))
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        use std::env;

        let path = env::var("GESBOX_CONFIG").unwrap_or_else(|_| "gesbox-config.toml".to_string());
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let cfg = Self::from_toml(&contents)?;
        tracing::info!(path, endpoints = cfg.source.endpoints.len(), "configuration loaded");
        Ok(cfg)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.endpoints.is_empty() {
            return Err(ConfigError::Invalid("source.endpoints must not be empty".into()));
        }
        if let Some(e) = self.source.endpoints.iter().find(|e| e.url.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "endpoint with empty url (device {:?})",
                e.device_id
            )));
        }
        if self.source.delimiter.len() != 1 {
            return Err(ConfigError::Invalid(format!(
                "source.delimiter must be a single byte, got '{}'",
                self.source.delimiter
            )));
        }
        if self.source.cumulative == CumulativePolicy::Supplied
            && self.source.columns.cumulative_column().is_none()
        {
            return Err(ConfigError::Invalid(
                "source.cumulative = \"supplied\" needs source.columns.cumulative_volume".into(),
            ));
        }
        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Invalid("poll.interval_secs must be greater than zero".into()));
        }
        self.dashboard.offset()?;
        parse_addr("dashboard.bind_addr", &self.dashboard.bind_addr)?;
        if let Some(metrics) = &self.metrics {
            parse_addr("metrics.bind_addr", &metrics.bind_addr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::offset;

    const MINIMAL: &str = r#"
        [source]
        endpoints = [{ url = "https://docs.google.com/spreadsheets/d/e/x/pub?output=csv" }]
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.source.kind, SourceKind::Delimited);
        assert_eq!(cfg.source.delimiter_byte(), b',');
        assert_eq!(cfg.source.cumulative, CumulativePolicy::Supplied);
        assert_eq!(cfg.source.columns, ColumnMapping::default());
        assert_eq!(cfg.poll.interval(), Duration::from_secs(60));
        assert_eq!(cfg.dashboard.default_bucket, TimeBucket::Day);
        assert_eq!(cfg.dashboard.offset().unwrap(), UtcOffset::UTC);
        assert!(cfg.metrics.is_none());
        assert!(cfg.source.request_timeout().is_none());
    }

    #[test]
    fn full_config_round_trips_all_sections() {
        let cfg = AppConfig::from_toml(
            r#"
            [source]
            kind = "structured"
            cumulative = "derived"
            delimiter = ";"
            request_timeout_secs = 15

            [[source.endpoints]]
            url = "https://example.test/gesbox1"
            device_id = "GesBox1"

            [[source.endpoints]]
            url = "https://example.test/gesbox2"
            device_id = "GesBox2"

            [source.columns]
            device_id = ""
            volume = "Volume (L)"
            timestamp = "Horodatage"

            [poll]
            interval_secs = 30

            [dashboard]
            bind_addr = "0.0.0.0:9000"
            display_offset = "+01:00"
            default_bucket = "hour"

            [metrics]
            bind_addr = "0.0.0.0:9100"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.source.kind, SourceKind::Structured);
        assert_eq!(cfg.source.endpoints[1].device_id.as_deref(), Some("GesBox2"));
        assert_eq!(cfg.source.delimiter_byte(), b';');
        assert_eq!(cfg.source.columns.device_column(), None);
        assert_eq!(cfg.source.columns.volume, "Volume (L)");
        assert_eq!(cfg.dashboard.offset().unwrap(), offset!(+1));
        assert_eq!(cfg.dashboard.default_bucket, TimeBucket::Hour);
        assert_eq!(cfg.source.request_timeout(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn rejects_invalid_settings() {
        let no_endpoints = "[source]\nendpoints = []";
        assert!(matches!(AppConfig::from_toml(no_endpoints), Err(ConfigError::Invalid(_))));

        let long_delimiter = format!("{MINIMAL}\ndelimiter = \"::\"");
        assert!(matches!(AppConfig::from_toml(&long_delimiter), Err(ConfigError::Invalid(_))));

        let zero_interval = format!("{MINIMAL}\n[poll]\ninterval_secs = 0");
        assert!(matches!(AppConfig::from_toml(&zero_interval), Err(ConfigError::Invalid(_))));

        let bad_offset = format!("{MINIMAL}\n[dashboard]\ndisplay_offset = \"Europe/Paris\"");
        assert!(matches!(AppConfig::from_toml(&bad_offset), Err(ConfigError::Invalid(_))));

        assert!(matches!(AppConfig::from_toml("not toml ["), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn supplied_policy_needs_cumulative_column() {
        let cfg = format!("{MINIMAL}\n[source.columns]\ncumulative_volume = \"\"");
        assert!(matches!(AppConfig::from_toml(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn offset_accepts_utc_alias() {
        assert_eq!(parse_offset("UTC").unwrap(), UtcOffset::UTC);
        assert_eq!(parse_offset("-05:00").unwrap(), offset!(-5));
    }
}
