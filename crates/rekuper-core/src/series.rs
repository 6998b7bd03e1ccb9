//! Turns a raw range-query result into per-entity observation windows

use crate::types::{ObservationWindow, SeriesWindow};
use serde::Deserialize;
use std::collections::HashMap;

/// Response envelope of the metrics backend's range-query API.
#[derive(Debug, Deserialize)]
pub struct RangeResponse {
    pub status: String,
    pub data: RangeData,
}

#[derive(Debug, Deserialize)]
pub struct RangeData {
    #[serde(default)]
    pub result: Vec<RangeSeries>,
}

/// One matched series: a label set plus ordered `[timestamp, value]` samples.
#[derive(Debug, Deserialize)]
pub struct RangeSeries {
    pub metric: HashMap<String, String>,
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

/// One observation window per non-empty series: `first_seen` from the first
/// sample, `last_seen` from the last. Consecutive batches may re-emit
/// overlapping windows for the same entity; deduplication happens in the
/// record store's merge, not here.
pub fn extract_windows(response: &RangeResponse) -> Vec<SeriesWindow> {
    response
        .data
        .result
        .iter()
        .filter_map(|series| {
            let first = series.values.first()?;
            let last = series.values.last()?;
            Some(SeriesWindow {
                labels: series.metric.clone(),
                window: ObservationWindow::new(first.0 as i64, last.0 as i64),
            })
        })
        .collect()
}
