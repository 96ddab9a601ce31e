use std::collections::BTreeMap;

use time::UtcOffset;

use crate::domain::{DeviceFilter, Reading, TimeBucket};

/// Readings of a single device, in ascending timestamp order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSeries {
    pub device_id: Option<String>,
    pub readings: Vec<Reading>,
}

/// One `(timestamp, cumulative volume)` chart point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ChartPoint {
    /// Milliseconds since the epoch.
    pub x: i64,
    pub y: f64,
    pub label: String,
}

/// Split an ordered list into independent per-device series.
///
/// Input order is kept inside every series, so a sorted working set yields
/// sorted series. Readings without a device id form their own series.
pub fn partition_by_device(readings: &[Reading]) -> Vec<DeviceSeries> {
    let mut by_device: BTreeMap<Option<&str>, Vec<Reading>> = BTreeMap::new();
    for r in readings {
        by_device.entry(r.device_id()).or_default().push(r.clone());
    }

    by_device
        .into_iter()
        .map(|(device_id, readings)| DeviceSeries {
            device_id: device_id.map(str::to_string),
            readings,
        })
        .collect()
}

pub fn filter_readings<'a>(
    readings: &'a [Reading],
    filter: &'a DeviceFilter,
) -> impl Iterator<Item = &'a Reading> + 'a {
    readings.iter().filter(move |r| filter.matches(r))
}

/// Distinct device ids, sorted.
pub fn device_ids(readings: &[Reading]) -> Vec<String> {
    let mut ids: Vec<String> = readings
        .iter()
        .filter_map(|r| r.device_id().map(str::to_string))
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Chart points for one series, labelled for `bucket` in the `offset` zone.
///
/// Readings whose timestamp cannot be represented as a date keep an empty
/// label; they are still plotted.
pub fn chart_points(
    series: &DeviceSeries,
    bucket: TimeBucket,
    offset: UtcOffset,
) -> Vec<ChartPoint> {
    series
        .readings
        .iter()
        .map(|r| {
            let label = r
                .ts()
                .ok()
                .and_then(|ts| bucket.label(ts.to_offset(offset)).ok())
                .unwrap_or_default();
            ChartPoint {
                x: r.timestamp_millis(),
                y: r.cumulative_volume(),
                label,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::offset;

    fn reading(device: &str, ts: i64, volume: f64, cumulative: f64) -> Reading {
        Reading::new(Some(device.to_string()), ts, volume, cumulative)
    }

    #[test]
    fn partition_keeps_devices_independent_and_ordered() {
        let readings = vec![
            reading("GesBox2", 10, 1.0, 1.0),
            reading("GesBox1", 20, 2.0, 2.0),
            reading("GesBox2", 30, 3.0, 4.0),
        ];

        let series = partition_by_device(&readings);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].device_id.as_deref(), Some("GesBox1"));
        assert_eq!(series[1].readings.len(), 2);
        assert_eq!(series[1].readings[0].timestamp(), 10);
        assert_eq!(series[1].readings[1].timestamp(), 30);
    }

    #[test]
    fn device_ids_are_distinct_and_sorted() {
        let readings = vec![
            reading("b", 1, 1.0, 1.0),
            reading("a", 2, 1.0, 1.0),
            reading("b", 3, 1.0, 2.0),
            Reading::new(None, 4, 1.0, 1.0),
        ];
        assert_eq!(device_ids(&readings), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn chart_points_use_cumulative_volume_and_local_labels() {
        let series = DeviceSeries {
            device_id: Some("GesBox1".into()),
            readings: vec![reading("GesBox1", 1_704_067_200, 1.5, 1.5)],
        };

        let points = chart_points(&series, TimeBucket::Hour, offset!(+1));
        assert_eq!(
            points,
            vec![ChartPoint {
                x: 1_704_067_200_000,
                y: 1.5,
                label: "01:00".into(),
            }]
        );
    }

    #[test]
    fn filter_selects_one_device() {
        let readings = vec![reading("a", 1, 1.0, 1.0), reading("b", 2, 1.0, 1.0)];
        let filter = DeviceFilter::Device("b".into());
        let picked: Vec<_> = filter_readings(&readings, &filter).collect();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].device_id(), Some("b"));
    }
}
