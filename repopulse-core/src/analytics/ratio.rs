//! Closed-to-open ratio per day.

use crate::types::MetricPoint;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Ratio of items closed on a day to items open that day.
///
/// `ratio` is `None` when nothing was open, so the chart shows a gap instead
/// of a division error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatioPoint {
    pub date: NaiveDate,
    pub ratio: Option<f64>,
}

/// Divide a sparse daily `closed` series by a dense daily `open` series.
///
/// The output has one point per day of `open`. Days missing from `closed`
/// count as zero closures.
pub fn closure_ratio(closed: &[MetricPoint], open: &[MetricPoint]) -> Vec<RatioPoint> {
    let mut closed_by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for point in closed {
        *closed_by_day.entry(point.date).or_insert(0.0) += point.value;
    }

    open.iter()
        .map(|point| {
            let ratio = if point.value == 0.0 {
                None
            } else {
                let closed = closed_by_day.get(&point.date).copied().unwrap_or(0.0);
                Some(closed / point.value)
            };
            RatioPoint {
                date: point.date,
                ratio,
            }
        })
        .collect()
}
