use std::collections::HashMap;

use gesbox_client::domain::Reading;
use serde::Deserialize;

use crate::transform::Sample;

/// Where `cumulative_volume` comes from. One policy per deployment: an export
/// either carries a running total or it does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CumulativePolicy {
    /// Use the export's cumulative column as-is.
    #[default]
    Supplied,
    /// Running sum of `volume` per device in timestamp order, from zero.
    Derived,
}

/// Sorts a cycle's samples and resolves their cumulative volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    policy: CumulativePolicy,
}

impl Aggregator {
    pub fn new(policy: CumulativePolicy) -> Self {
        Self { policy }
    }

    /// Stable sort by timestamp, then build the readings. Running sums are
    /// kept per device id, so one GesBox never feeds another's total.
    ///
    /// A sample whose running total would overflow to infinity is dropped
    /// and the device's total stays at its last finite value; callers see
    /// fewer readings than samples.
    pub fn aggregate(&self, mut samples: Vec<Sample>) -> Vec<Reading> {
        samples.sort_by_key(|s| s.timestamp);

        let mut running: HashMap<Option<String>, f64> = HashMap::new();
        samples
            .into_iter()
            .filter_map(|s| {
                let cumulative = match (self.policy, s.cumulative_volume) {
                    (CumulativePolicy::Supplied, Some(supplied)) => supplied,
                    _ => {
                        let total = running.entry(s.device_id.clone()).or_insert(0.0);
                        let next = *total + s.volume;
                        if !next.is_finite() {
                            metrics::counter!("gesbox_rows_rejected_total", "kind" => "overflow")
                                .increment(1);
                            tracing::warn!(
                                device_id = ?s.device_id,
                                timestamp = s.timestamp,
                                volume = s.volume,
                                "running total overflowed; sample dropped"
                            );
                            return None;
                        }
                        *total = next;
                        next
                    }
                };
                Some(Reading::new(s.device_id, s.timestamp, s.volume, cumulative))
            })
            .collect()
    }
}
