use std::{convert::Infallible, fmt, str::FromStr};

use super::Reading;

/// Device selection for the chart and history views.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceFilter {
    #[default]
    All,
    Device(String),
}

impl DeviceFilter {
    pub fn matches(&self, reading: &Reading) -> bool {
        match self {
            Self::All => true,
            Self::Device(id) => reading.device_id() == Some(id.as_str()),
        }
    }
}

impl FromStr for DeviceFilter {
    type Err = Infallible;

    /// `"all"` (any case) and the empty string select every device.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            Ok(Self::Device(s.to_string()))
        }
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Device(id) => f.write_str(id),
        }
    }
}
