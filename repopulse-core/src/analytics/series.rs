//! Chart-ready series.
//!
//! A [`Series`] is the hand-off point to whatever draws the chart: a name and
//! `(x, y)` points ascending by `x`, with `y = None` marking a gap. Bucketed
//! series are re-labelled with the canonical bucket start on the way in, so
//! series from different domains always share x values.

use super::join::JoinedAggregate;
use super::ratio::RatioPoint;
use crate::cache::NoDataReason;
use crate::types::{Granularity, MetricPoint};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// How a series treats missing x values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    /// Only buckets with events appear
    Sparse,
    /// One point per day of the range
    Dense,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// Serialized as `YYYY-MM-DD`
    pub x: NaiveDate,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub kind: SeriesKind,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    /// Sparse series of bucket counts.
    ///
    /// Dates are truncated to `granularity`; points that land on the same
    /// bucket are summed.
    pub fn bucketed(
        name: impl Into<String>,
        granularity: Granularity,
        points: &[MetricPoint],
    ) -> Self {
        let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for point in points {
            *buckets.entry(granularity.truncate(point.date)).or_insert(0.0) += point.value;
        }
        Self {
            name: name.into(),
            kind: SeriesKind::Sparse,
            points: buckets
                .into_iter()
                .map(|(x, y)| SeriesPoint { x, y: Some(y) })
                .collect(),
        }
    }

    /// Dense daily series.
    pub fn daily(name: impl Into<String>, points: &[MetricPoint]) -> Self {
        let mut points: Vec<SeriesPoint> = points
            .iter()
            .map(|p| SeriesPoint {
                x: p.date,
                y: Some(p.value),
            })
            .collect();
        points.sort_by_key(|p| p.x);
        Self {
            name: name.into(),
            kind: SeriesKind::Dense,
            points,
        }
    }

    /// Dense daily ratio series; undefined ratios become gaps.
    pub fn from_ratio(name: impl Into<String>, points: &[RatioPoint]) -> Self {
        let mut points: Vec<SeriesPoint> = points
            .iter()
            .map(|p| SeriesPoint {
                x: p.date,
                y: p.ratio,
            })
            .collect();
        points.sort_by_key(|p| p.x);
        Self {
            name: name.into(),
            kind: SeriesKind::Dense,
            points,
        }
    }

    /// Sparse series of per-bucket averages; buckets without responses become gaps.
    pub fn from_joined(name: impl Into<String>, aggregates: &[JoinedAggregate]) -> Self {
        let mut points: Vec<SeriesPoint> = aggregates
            .iter()
            .map(|a| SeriesPoint {
                x: a.bucket.start,
                y: a.average_secondary_count,
            })
            .collect();
        points.sort_by_key(|p| p.x);
        Self {
            name: name.into(),
            kind: SeriesKind::Sparse,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// What a chart hands to the renderer: series, or a neutral empty state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChartData {
    Ready {
        title: String,
        /// Width of the sparse buckets; dense series are always daily
        granularity: Granularity,
        series: Vec<Series>,
    },
    NoData {
        title: String,
        reason: String,
    },
}

impl ChartData {
    pub fn no_data(title: impl Into<String>, reason: &NoDataReason) -> Self {
        ChartData::NoData {
            title: title.into(),
            reason: reason.to_string(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ChartData::Ready { title, .. } | ChartData::NoData { title, .. } => title,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ChartData::Ready { .. })
    }

    pub fn series(&self) -> &[Series] {
        match self {
            ChartData::Ready { series, .. } => series,
            ChartData::NoData { .. } => &[],
        }
    }

    /// Look up a series by name.
    pub fn find(&self, name: &str) -> Option<&Series> {
        self.series().iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeBucket;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bucketed_normalizes_labels() {
        let points = vec![
            MetricPoint::new(date(2024, 2, 14), 2.0),
            MetricPoint::new(date(2024, 1, 1), 1.0),
            MetricPoint::new(date(2024, 2, 1), 3.0),
        ];
        let series = Series::bucketed("Created", Granularity::Month, &points);

        assert_eq!(series.kind, SeriesKind::Sparse);
        assert_eq!(
            series.points,
            vec![
                SeriesPoint {
                    x: date(2024, 1, 1),
                    y: Some(1.0)
                },
                SeriesPoint {
                    x: date(2024, 2, 1),
                    y: Some(5.0)
                },
            ]
        );
    }

    #[test]
    fn test_ratio_gaps_survive() {
        let ratio = vec![
            RatioPoint {
                date: date(2024, 1, 2),
                ratio: Some(0.5),
            },
            RatioPoint {
                date: date(2024, 1, 1),
                ratio: None,
            },
        ];
        let series = Series::from_ratio("Ratio", &ratio);
        assert_eq!(series.points[0].x, date(2024, 1, 1));
        assert_eq!(series.points[0].y, None);
        assert_eq!(series.kind, SeriesKind::Dense);
    }

    #[test]
    fn test_joined_series_uses_bucket_start() {
        let aggregates = vec![JoinedAggregate {
            bucket: TimeBucket::containing_date(Granularity::Month, date(2024, 3, 17)),
            average_secondary_count: None,
            primaries: 1,
            responded: 0,
        }];
        let series = Series::from_joined("Avg", &aggregates);
        assert_eq!(
            series.points,
            vec![SeriesPoint {
                x: date(2024, 3, 1),
                y: None
            }]
        );
    }

    #[test]
    fn test_chart_data_json_shape() {
        let chart = ChartData::Ready {
            title: "Commits".to_string(),
            granularity: Granularity::Week,
            series: vec![Series::bucketed(
                "Commits",
                Granularity::Week,
                &[MetricPoint::new(date(2024, 1, 3), 4.0)],
            )],
        };

        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["granularity"], "week");
        assert_eq!(json["series"][0]["points"][0]["x"], "2024-01-01");
        assert_eq!(json["series"][0]["points"][0]["y"], 4.0);

        let empty = ChartData::no_data("Commits", &NoDataReason::Empty);
        let json = serde_json::to_value(&empty).unwrap();
        assert_eq!(json["status"], "no_data");
        assert_eq!(json["reason"], "no records available");
        assert!(empty.series().is_empty());
    }
}
