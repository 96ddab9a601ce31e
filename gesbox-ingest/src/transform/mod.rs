use time::{
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset,
};

use crate::{
    aggregate::CumulativePolicy,
    config::ColumnMapping,
    pipeline::{Envelope, PipelineError, Transform},
    sources::RawRow,
};
use gesbox_client::domain::Reading;

/// A validated row before aggregation. `cumulative_volume` is present only
/// when the source supplies it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub device_id: Option<String>,
    pub timestamp: i64,
    pub volume: f64,
    pub cumulative_volume: Option<f64>,
}

impl From<&Reading> for Sample {
    fn from(r: &Reading) -> Self {
        Self {
            device_id: r.device_id().map(str::to_string),
            timestamp: r.timestamp(),
            volume: r.volume(),
            cumulative_volume: Some(r.cumulative_volume()),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    #[error("not a number")]
    NotANumber,
    #[error("not a finite number")]
    NotFinite,
    #[error("timestamp is negative")]
    NegativeTimestamp,
    #[error("timestamp is outside the representable date range")]
    OutOfRange,
    #[error("neither an epoch nor a recognised date")]
    UnrecognizedTimestamp,
}

fn unquote(raw: &str) -> String {
    raw.replace('"', "").trim().to_string()
}

/// Float with either `.` or `,` as decimal separator. NaN and infinities,
/// including overflow to infinity, are rejected.
pub fn parse_float(raw: &str) -> Result<f64, FieldError> {
    let normalized = unquote(raw).replace(',', ".");
    let value: f64 = normalized.parse().map_err(|_| FieldError::NotANumber)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FieldError::NotFinite)
    }
}

/// Integer seconds since the epoch.
pub fn parse_epoch_seconds(raw: &str) -> Result<i64, FieldError> {
    let ts: i64 = unquote(raw).parse().map_err(|_| FieldError::NotANumber)?;
    if ts < 0 {
        return Err(FieldError::NegativeTimestamp);
    }
    OffsetDateTime::from_unix_timestamp(ts).map_err(|_| FieldError::OutOfRange)?;
    Ok(ts)
}

const DMY_HMS: &[FormatItem<'_>] =
    format_description!("[day]/[month]/[year] [hour]:[minute]:[second]");
const DMY_HM: &[FormatItem<'_>] = format_description!("[day]/[month]/[year] [hour]:[minute]");
const YMD_HMS: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DMY: &[FormatItem<'_>] = format_description!("[day]/[month]/[year]");

/// Formatted date to epoch seconds. Strings without an offset are read in
/// `offset`.
pub fn parse_date_string(raw: &str, offset: UtcOffset) -> Result<i64, FieldError> {
    let s = unquote(raw);

    let parsed = OffsetDateTime::parse(&s, &Rfc3339)
        .ok()
        .or_else(|| {
            PrimitiveDateTime::parse(&s, DMY_HMS)
                .or_else(|_| PrimitiveDateTime::parse(&s, DMY_HM))
                .or_else(|_| PrimitiveDateTime::parse(&s, YMD_HMS))
                .or_else(|_| {
                    Date::parse(&s, DMY).map(|d| PrimitiveDateTime::new(d, Time::MIDNIGHT))
                })
                .ok()
                .map(|dt| dt.assume_offset(offset))
        })
        .ok_or(FieldError::UnrecognizedTimestamp)?;

    let ts = parsed.unix_timestamp();
    if ts < 0 {
        return Err(FieldError::NegativeTimestamp);
    }
    Ok(ts)
}

/// Epoch seconds first, then the date formats.
pub fn parse_timestamp(raw: &str, offset: UtcOffset) -> Result<i64, FieldError> {
    match parse_epoch_seconds(raw) {
        Ok(ts) => Ok(ts),
        Err(FieldError::NotANumber) => parse_date_string(raw, offset),
        Err(e) => Err(e),
    }
}

/// Row validator: maps configured columns onto a [`Sample`].
#[derive(Debug, Clone)]
pub struct RowValidation {
    columns: ColumnMapping,
    policy: CumulativePolicy,
    offset: UtcOffset,
}

impl RowValidation {
    pub fn new(columns: ColumnMapping, policy: CumulativePolicy, offset: UtcOffset) -> Self {
        Self {
            columns,
            policy,
            offset,
        }
    }

    pub fn validate(&self, row: &RawRow) -> Result<Sample, PipelineError> {
        let volume = self.convert(row, &self.columns.volume, parse_float)?;

        let cumulative_volume = match (self.policy, self.columns.cumulative_column()) {
            (CumulativePolicy::Supplied, Some(column)) => {
                Some(self.convert(row, column, parse_float)?)
            }
            (CumulativePolicy::Supplied, None) => {
                return Err(PipelineError::Format {
                    line: row.line,
                    reason: "no cumulative volume column is mapped".to_string(),
                })
            }
            (CumulativePolicy::Derived, _) => None,
        };

        let offset = self.offset;
        let timestamp =
            self.convert(row, &self.columns.timestamp, |raw| parse_timestamp(raw, offset))?;

        Ok(Sample {
            device_id: self.device_id(row)?,
            timestamp,
            volume,
            cumulative_volume,
        })
    }

    /// The device column wins when the export has one; otherwise the
    /// endpoint's configured id applies.
    fn device_id(&self, row: &RawRow) -> Result<Option<String>, PipelineError> {
        match self.columns.device_column().and_then(|c| row.get(c).map(|v| (c, v))) {
            Some((column, "")) => Err(PipelineError::Format {
                line: row.line,
                reason: format!("required field '{column}' is empty"),
            }),
            Some((_, value)) => Ok(Some(value.to_string())),
            None => Ok(row.device_hint.as_deref().map(str::to_string)),
        }
    }

    fn required<'r>(&self, row: &'r RawRow, column: &str) -> Result<&'r str, PipelineError> {
        match row.get(column) {
            None => Err(PipelineError::Format {
                line: row.line,
                reason: format!("missing column '{column}'"),
            }),
            Some(v) if unquote(v).is_empty() => Err(PipelineError::Format {
                line: row.line,
                reason: format!("required field '{column}' is empty"),
            }),
            Some(v) => Ok(v),
        }
    }

    fn convert<T>(
        &self,
        row: &RawRow,
        column: &str,
        parse: impl FnOnce(&str) -> Result<T, FieldError>,
    ) -> Result<T, PipelineError> {
        let raw = self.required(row, column)?;
        parse(raw).map_err(|e| {
            metrics::counter!("gesbox_validation_rejected_total", "field" => column.to_string())
                .increment(1);
            PipelineError::Conversion {
                line: row.line,
                field: column.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            }
        })
    }
}

#[async_trait::async_trait]
impl Transform<RawRow, Sample> for RowValidation {
    async fn apply(&self, input: Envelope<RawRow>) -> Result<Envelope<Sample>, PipelineError> {
        let sample = self.validate(&input.payload)?;
        Ok(Envelope {
            payload: sample,
            received_at: input.received_at,
        })
    }
}
