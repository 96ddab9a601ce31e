//! View models handed to the chart widget and the history table.

use gesbox_client::{
    domain::{DeviceFilter, Reading, TimeBucket},
    series::{self, ChartPoint},
};
use serde::{Deserialize, Serialize};
use time::{macros::format_description, OffsetDateTime, UtcOffset};

use crate::snapshot::{CycleStatus, Snapshot};

pub const X_AXIS_TITLE: &str = "Date/Heure";
pub const Y_AXIS_TITLE: &str = "Volume d'eau Cumulé (L)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub device_id: Option<String>,
    pub volume: String,
    pub cumulative_volume: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    pub status: CycleStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub fetched_at: Option<OffsetDateTime>,
    pub digest: String,
    pub rejected: usize,
    pub rows: Vec<HistoryRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub device_id: Option<String>,
    pub label: String,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub status: CycleStatus,
    pub unit: TimeBucket,
    pub display_format: &'static str,
    pub tooltip_format: &'static str,
    pub x_title: &'static str,
    pub y_title: &'static str,
    pub series: Vec<ChartSeries>,
}

/// `dd/MM/yyyy HH:mm:ss` in the display offset. Timestamps outside the
/// representable range render as the raw epoch value.
pub fn format_local(ts: i64, offset: UtcOffset) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|at| {
            at.to_offset(offset)
                .format(format_description!("[day]/[month]/[year] [hour]:[minute]:[second]"))
                .ok()
        })
        .unwrap_or_else(|| ts.to_string())
}

pub fn history_row(r: &Reading, offset: UtcOffset) -> HistoryRow {
    HistoryRow {
        device_id: r.device_id().map(str::to_string),
        volume: format!("{:.2}", r.volume()),
        cumulative_volume: format!("{:.2}", r.cumulative_volume()),
        date: format_local(r.timestamp(), offset),
    }
}

pub fn history_rows(
    readings: &[Reading],
    filter: &DeviceFilter,
    order: Order,
    offset: UtcOffset,
) -> Vec<HistoryRow> {
    let mut rows: Vec<HistoryRow> = series::filter_readings(readings, filter)
        .map(|r| history_row(r, offset))
        .collect();
    if order == Order::Desc {
        rows.reverse();
    }
    rows
}

pub fn history_view(
    snapshot: &Snapshot,
    status: CycleStatus,
    filter: &DeviceFilter,
    order: Order,
    offset: UtcOffset,
) -> HistoryView {
    HistoryView {
        status,
        fetched_at: snapshot.fetched_at(),
        digest: snapshot.digest().to_string(),
        rejected: snapshot.rejected(),
        rows: history_rows(snapshot.readings(), filter, order, offset),
    }
}

/// One line per device; devices with no points after filtering are left out.
pub fn chart_view(
    snapshot: &Snapshot,
    status: CycleStatus,
    filter: &DeviceFilter,
    bucket: TimeBucket,
    offset: UtcOffset,
) -> ChartView {
    let selected: Vec<Reading> =
        series::filter_readings(snapshot.readings(), filter).cloned().collect();

    let series = series::partition_by_device(&selected)
        .into_iter()
        .filter(|s| !s.readings.is_empty())
        .map(|s| ChartSeries {
            label: s.device_id.clone().unwrap_or_else(|| "GesBox".to_string()),
            points: series::chart_points(&s, bucket, offset),
            device_id: s.device_id,
        })
        .collect();

    ChartView {
        status,
        unit: bucket,
        display_format: bucket.display_format(),
        tooltip_format: bucket.tooltip_format(),
        x_title: X_AXIS_TITLE,
        y_title: Y_AXIS_TITLE,
        series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::offset;

    fn snapshot() -> Snapshot {
        Snapshot::new(
            vec![
                Reading::new(Some("GesBox1".into()), 1_704_067_200, 1.5, 1.5),
                Reading::new(Some("GesBox2".into()), 1_704_070_800, 2.0, 2.0),
                Reading::new(Some("GesBox1".into()), 1_704_074_400, 2.5, 4.0),
            ],
            1,
            "d".into(),
        )
    }

    fn chart(snapshot: &Snapshot, filter: &DeviceFilter, bucket: TimeBucket) -> ChartView {
        chart_view(snapshot, CycleStatus::Fresh, filter, bucket, UtcOffset::UTC)
    }

    #[test]
    fn history_rows_are_formatted_and_localised() {
        let rows = history_rows(snapshot().readings(), &DeviceFilter::All, Order::Asc, offset!(+1));
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            HistoryRow {
                device_id: Some("GesBox1".into()),
                volume: "1.50".into(),
                cumulative_volume: "1.50".into(),
                date: "01/01/2024 01:00:00".into(),
            }
        );
    }

    #[test]
    fn history_rows_filter_and_reverse() {
        let filter = DeviceFilter::Device("GesBox1".into());
        let rows = history_rows(snapshot().readings(), &filter, Order::Desc, UtcOffset::UTC);
        let cumulative: Vec<_> = rows.iter().map(|r| r.cumulative_volume.as_str()).collect();
        assert_eq!(cumulative, vec!["4.00", "1.50"]);
    }

    #[test]
    fn chart_has_one_series_per_device() {
        let view = chart(&snapshot(), &DeviceFilter::All, TimeBucket::Hour);
        assert_eq!(view.series.len(), 2);
        assert_eq!(view.series[0].label, "GesBox1");
        let ys: Vec<f64> = view.series[0].points.iter().map(|p| p.y).collect();
        assert_eq!(ys, vec![1.5, 4.0]);
        assert_eq!(view.series[0].points[0].x, 1_704_067_200_000);
        assert_eq!(view.display_format, "HH:mm");
    }

    #[test]
    fn bucket_changes_labels_not_points() {
        let snap = snapshot();
        let by_hour = chart(&snap, &DeviceFilter::All, TimeBucket::Hour);
        let by_year = chart(&snap, &DeviceFilter::All, TimeBucket::Year);

        let xs = |v: &ChartView| -> Vec<i64> {
            v.series.iter().flat_map(|s| s.points.iter().map(|p| p.x)).collect()
        };
        assert_eq!(xs(&by_hour), xs(&by_year));
        assert_eq!(by_year.series[0].points[0].label, "2024");
    }

    #[test]
    fn filtered_chart_omits_empty_series() {
        let filter = DeviceFilter::Device("GesBox2".into());
        let view = chart(&snapshot(), &filter, TimeBucket::Day);
        assert_eq!(view.series.len(), 1);
        assert_eq!(view.series[0].device_id.as_deref(), Some("GesBox2"));

        let none = DeviceFilter::Device("GesBox9".into());
        assert!(chart_view(&snapshot(), CycleStatus::Fresh, &none, TimeBucket::Day, UtcOffset::UTC)
            .series
            .is_empty());
    }

    #[test]
    fn empty_snapshot_renders_empty_state() {
        let empty = Snapshot::empty();
        let view = history_view(
            &empty,
            CycleStatus::Pending,
            &DeviceFilter::All,
            Order::Asc,
            UtcOffset::UTC,
        );
        assert!(view.rows.is_empty());
        assert!(view.fetched_at.is_none());
    }
}
