//! Open-item counts per day.
//!
//! A record is open on day `d` when `created <= d < closed`, or when
//! `created <= d` and it has no `closed` time. Comparisons are made on UTC
//! calendar dates, so an item closed on `d` no longer counts on `d`.
//!
//! [`open_counts_in`] is a sweep over sorted +1/-1 events and runs in
//! `O((n + d) log n)`. [`open_counts_naive`] re-scans every record for every
//! day; it is kept as the reference the sweep is tested against.

use crate::types::{Dataset, DayRange, MetricPoint, TimestampField};
use chrono::NaiveDate;

/// Day range covered by a dataset.
///
/// From the earliest creation to the latest creation or closure. `None` when
/// no record has a creation time.
pub fn observed_range(dataset: &Dataset) -> Option<DayRange> {
    let mut first: Option<NaiveDate> = None;
    let mut last: Option<NaiveDate> = None;

    for (created, closed) in intervals(dataset) {
        first = Some(first.map_or(created, |f| f.min(created)));
        let latest = closed.map_or(created, |c| c.max(created));
        last = Some(last.map_or(latest, |l| l.max(latest)));
    }

    Some(DayRange::new(first?, last?))
}

/// Open counts for every day of the dataset's observed range.
pub fn open_counts(dataset: &Dataset) -> Vec<MetricPoint> {
    match observed_range(dataset) {
        Some(range) => open_counts_in(dataset, range),
        None => Vec::new(),
    }
}

/// Open counts for every day of `range`.
pub fn open_counts_in(dataset: &Dataset, range: DayRange) -> Vec<MetricPoint> {
    let mut events: Vec<(NaiveDate, i64)> = Vec::with_capacity(dataset.len() * 2);
    for (created, closed) in intervals(dataset) {
        match closed {
            // Closed on or before the day it was created: never open
            Some(closed) if closed <= created => {}
            Some(closed) => {
                events.push((created, 1));
                events.push((closed, -1));
            }
            None => events.push((created, 1)),
        }
    }
    events.sort_unstable();

    let mut points = Vec::with_capacity(range.len());
    let mut open: i64 = 0;
    let mut next = 0;
    for day in range.days() {
        while next < events.len() && events[next].0 <= day {
            open += events[next].1;
            next += 1;
        }
        points.push(MetricPoint::new(day, open as f64));
    }
    points
}

/// Reference implementation: count open records by scanning every record per day.
pub fn open_counts_naive(dataset: &Dataset, range: DayRange) -> Vec<MetricPoint> {
    let intervals: Vec<_> = intervals(dataset).collect();
    range
        .days()
        .map(|day| {
            let open = intervals
                .iter()
                .filter(|(created, closed)| *created <= day && closed.map_or(true, |c| c > day))
                .count();
            MetricPoint::new(day, open as f64)
        })
        .collect()
}

/// `(created, closed)` dates of every well-formed record.
fn intervals(dataset: &Dataset) -> impl Iterator<Item = (NaiveDate, Option<NaiveDate>)> + '_ {
    dataset.records().iter().filter_map(|record| {
        let created = record.timestamp(&TimestampField::Created)?.date_naive();
        let closed = record.closed.map(|c| c.date_naive());
        Some((created, closed))
    })
}
