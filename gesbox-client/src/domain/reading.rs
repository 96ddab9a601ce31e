use time::OffsetDateTime;

/// One validated measurement sample from a GesBox.
///
/// Readings are immutable once built; a fetch cycle produces a fresh set and
/// the previous one is dropped wholesale.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Reading {
    device_id: Option<String>,
    timestamp: i64,
    volume: f64,
    cumulative_volume: f64,
}

impl Reading {
    pub fn new(
        device_id: Option<String>,
        timestamp: i64,
        volume: f64,
        cumulative_volume: f64,
    ) -> Self {
        Self {
            device_id,
            timestamp,
            volume,
            cumulative_volume,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Seconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn cumulative_volume(&self) -> f64 {
        self.cumulative_volume
    }

    pub fn ts(&self) -> Result<OffsetDateTime, time::error::ComponentRange> {
        OffsetDateTime::from_unix_timestamp(self.timestamp)
    }

    /// Chart x-coordinate in milliseconds.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.saturating_mul(1000)
    }
}
