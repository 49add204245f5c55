// In-memory helpers over the measurement feed supplied by an external reader.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// A single RSSI reading of a device by a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub sensor_id: String,
    pub device_id: String,
    pub rssi_dbm: f64,
    /// Unix time in milliseconds
    pub timestamp: i64,
}

/// Sorted, de-duplicated device ids seen in the feed.
pub fn device_ids(feed: &[Measurement]) -> Vec<String> {
    feed.iter()
        .map(|m| m.device_id.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Latest reading of `device_id` per sensor.
///
/// On equal timestamps the record appearing later in the feed wins.
pub fn latest_measurements(feed: &[Measurement], device_id: &str) -> HashMap<String, f64> {
    let mut latest = HashMap::<&str, &Measurement>::new();

    for m in feed.iter().filter(|m| m.device_id == device_id) {
        let entry = latest.entry(m.sensor_id.as_str()).or_insert(m);
        if m.timestamp >= entry.timestamp {
            *entry = m;
        }
    }

    latest
        .into_iter()
        .map(|(sensor_id, m)| (sensor_id.to_owned(), m.rssi_dbm))
        .collect()
}

/// Every reading of `device_id` per sensor, in feed order.
pub fn device_series(feed: &[Measurement], device_id: &str) -> HashMap<String, Vec<f64>> {
    let mut series = HashMap::<String, Vec<f64>>::new();

    for m in feed.iter().filter(|m| m.device_id == device_id) {
        series.entry(m.sensor_id.clone()).or_default().push(m.rssi_dbm);
    }

    series
}
