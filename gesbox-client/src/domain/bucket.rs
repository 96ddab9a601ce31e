use std::{fmt, str::FromStr};

use time::{macros::format_description, OffsetDateTime};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown time bucket '{0}' (expected hour, day, week, month or year)")]
pub struct UnknownBucket(pub String);

/// Chart time granularity.
///
/// A bucket only changes how the time axis is labelled; it never decides
/// which readings are plotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TimeBucket {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl TimeBucket {
    pub const ALL: [TimeBucket; 5] = [Self::Hour, Self::Day, Self::Week, Self::Month, Self::Year];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Axis tick pattern handed to the chart widget.
    pub fn display_format(self) -> &'static str {
        match self {
            Self::Hour => "HH:mm",
            Self::Day | Self::Week => "dd/MM/yyyy",
            Self::Month => "MMM yyyy",
            Self::Year => "yyyy",
        }
    }

    /// Tooltip pattern, identical for every bucket.
    pub fn tooltip_format(self) -> &'static str {
        "dd/MM/yyyy HH:mm"
    }

    /// Render `at` the way the axis would label it for this bucket.
    pub fn label(self, at: OffsetDateTime) -> Result<String, time::error::Format> {
        match self {
            Self::Hour => at.format(format_description!("[hour]:[minute]")),
            Self::Day | Self::Week => at.format(format_description!("[day]/[month]/[year]")),
            Self::Month => at.format(format_description!("[month repr:short] [year]")),
            Self::Year => at.format(format_description!("[year]")),
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeBucket {
    type Err = UnknownBucket;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == wanted)
            .ok_or_else(|| UnknownBucket(s.to_string()))
    }
}
