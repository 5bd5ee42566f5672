//! Time-bucket counts.
//!
//! Bucket labels are always the canonical first day of the bucket: the Monday
//! of a week, the 1st of a month, January 1st of a year. Series built from
//! different domains therefore line up on the same x values.
//!
//! Output is sparse: buckets without records are omitted, not zero-filled.

use crate::types::{DateFilter, Dataset, Granularity, MetricPoint, TimestampField};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Count records per bucket of `granularity`, keyed on `field`.
pub fn count_per_bucket(
    dataset: &Dataset,
    field: &TimestampField,
    granularity: Granularity,
) -> Vec<MetricPoint> {
    count_per_bucket_in(dataset, field, granularity, &DateFilter::default())
}

/// Like [`count_per_bucket`], restricted to timestamps accepted by `filter`.
pub fn count_per_bucket_in(
    dataset: &Dataset,
    field: &TimestampField,
    granularity: Granularity,
    filter: &DateFilter,
) -> Vec<MetricPoint> {
    let (counts, skipped) = tally(dataset, field, granularity, filter);

    if skipped > 0 {
        tracing::debug!(
            domain = %dataset.domain(),
            field = %field,
            skipped,
            "Records without timestamp skipped while bucketing"
        );
    }

    counts
        .into_iter()
        .map(|(date, count)| MetricPoint::new(date, count as f64))
        .collect()
}

/// Per-bucket counts plus the number of malformed records.
///
/// A missing close time means "still open", so records without one are not
/// malformed when bucketing on [`TimestampField::Closed`].
fn tally(
    dataset: &Dataset,
    field: &TimestampField,
    granularity: Granularity,
    filter: &DateFilter,
) -> (BTreeMap<NaiveDate, u64>, usize) {
    let mut counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    let mut skipped = 0usize;

    for record in dataset.records() {
        let Some(ts) = record.timestamp(field) else {
            if *field != TimestampField::Closed {
                skipped += 1;
            }
            continue;
        };
        if !filter.accepts(ts) {
            continue;
        }
        *counts.entry(granularity.truncate(ts.date_naive())).or_insert(0) += 1;
    }

    (counts, skipped)
}

/// Count distinct values of `value_field` per bucket, keyed on `field`.
///
/// Used for "how many different contributors were active this month"-style
/// metrics. Records missing either the timestamp or the value are skipped.
pub fn count_distinct_per_bucket(
    dataset: &Dataset,
    field: &TimestampField,
    value_field: &str,
    granularity: Granularity,
    filter: &DateFilter,
) -> Vec<MetricPoint> {
    let mut distinct: BTreeMap<NaiveDate, BTreeSet<String>> = BTreeMap::new();
    let mut skipped = 0usize;

    for record in dataset.records() {
        let value = record.field(value_field).and_then(|v| v.as_key());
        let (Some(ts), Some(value)) = (record.timestamp(field), value) else {
            skipped += 1;
            continue;
        };
        if !filter.accepts(ts) {
            continue;
        }
        distinct
            .entry(granularity.truncate(ts.date_naive()))
            .or_default()
            .insert(value);
    }

    if skipped > 0 {
        tracing::debug!(
            domain = %dataset.domain(),
            field = %field,
            value_field,
            skipped,
            "Records without timestamp or value skipped while counting distinct values"
        );
    }

    distinct
        .into_iter()
        .map(|(date, values)| MetricPoint::new(date, values.len() as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Domain, EventRecord};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn prs(created: &[DateTime<Utc>]) -> Dataset {
        let records = created
            .iter()
            .enumerate()
            .map(|(i, c)| EventRecord::new(i.to_string(), 1, *c))
            .collect();
        Dataset::new(Domain::PullRequests, records)
    }

    #[test]
    fn test_monthly_buckets_are_first_of_month() {
        let dataset = prs(&[ts(2024, 2, 20, 9), ts(2024, 1, 15, 3), ts(2024, 2, 3, 22)]);

        let points = count_per_bucket(&dataset, &TimestampField::Created, Granularity::Month);
        assert_eq!(
            points,
            vec![
                MetricPoint::new(date(2024, 1, 1), 1.0),
                MetricPoint::new(date(2024, 2, 1), 2.0),
            ]
        );
    }

    #[test]
    fn test_bucketing_ignores_insertion_order() {
        let forward = prs(&[ts(2024, 1, 15, 3), ts(2024, 2, 3, 22), ts(2024, 2, 20, 9)]);
        let backward = prs(&[ts(2024, 2, 20, 9), ts(2024, 2, 3, 22), ts(2024, 1, 15, 3)]);

        for granularity in [
            Granularity::Day,
            Granularity::Week,
            Granularity::Month,
            Granularity::Year,
        ] {
            assert_eq!(
                count_per_bucket(&forward, &TimestampField::Created, granularity),
                count_per_bucket(&backward, &TimestampField::Created, granularity)
            );
        }
    }

    #[test]
    fn test_weekly_labels_are_monday() {
        // Wed 2024-01-03, Sun 2024-01-07, Mon 2024-01-08
        let dataset = prs(&[ts(2024, 1, 3, 12), ts(2024, 1, 7, 23), ts(2024, 1, 8, 0)]);

        let points = count_per_bucket(&dataset, &TimestampField::Created, Granularity::Week);
        assert_eq!(
            points,
            vec![
                MetricPoint::new(date(2024, 1, 1), 2.0),
                MetricPoint::new(date(2024, 1, 8), 1.0),
            ]
        );
    }

    #[test]
    fn test_yearly_and_daily_buckets() {
        let dataset = prs(&[ts(2023, 12, 31, 23), ts(2024, 6, 1, 0), ts(2024, 6, 1, 18)]);

        let yearly = count_per_bucket(&dataset, &TimestampField::Created, Granularity::Year);
        assert_eq!(
            yearly,
            vec![
                MetricPoint::new(date(2023, 1, 1), 1.0),
                MetricPoint::new(date(2024, 1, 1), 2.0),
            ]
        );

        let daily = count_per_bucket(&dataset, &TimestampField::Created, Granularity::Day);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[1], MetricPoint::new(date(2024, 6, 1), 2.0));
    }

    #[test]
    fn test_sparse_output_and_empty_dataset() {
        let dataset = prs(&[ts(2024, 1, 1, 0), ts(2024, 4, 1, 0)]);
        let points = count_per_bucket(&dataset, &TimestampField::Created, Granularity::Month);
        // February and March are omitted, not zero
        assert_eq!(points.len(), 2);

        let empty = Dataset::empty(Domain::PullRequests);
        assert!(count_per_bucket(&empty, &TimestampField::Created, Granularity::Month).is_empty());
    }

    #[test]
    fn test_malformed_and_missing_timestamps_are_skipped() {
        let mut malformed = EventRecord::new("bad", 1, ts(2024, 1, 1, 0));
        malformed.created = None;
        let closed = EventRecord::new("c", 1, ts(2024, 1, 2, 0)).closed_at(ts(2024, 3, 9, 0));
        let open = EventRecord::new("o", 1, ts(2024, 1, 3, 0));
        let dataset = Dataset::new(Domain::Issues, vec![malformed, closed, open]);

        let created = count_per_bucket(&dataset, &TimestampField::Created, Granularity::Month);
        assert_eq!(created, vec![MetricPoint::new(date(2024, 1, 1), 2.0)]);

        let closed = count_per_bucket(&dataset, &TimestampField::Closed, Granularity::Month);
        assert_eq!(closed, vec![MetricPoint::new(date(2024, 3, 1), 1.0)]);
    }

    #[test]
    fn test_open_records_are_not_skips_when_bucketing_closed() {
        let mut malformed = EventRecord::new("bad", 1, ts(2024, 1, 1, 0));
        malformed.created = None;
        let closed = EventRecord::new("c", 1, ts(2024, 1, 2, 0)).closed_at(ts(2024, 3, 9, 0));
        let open = EventRecord::new("o", 1, ts(2024, 1, 3, 0));
        let dataset = Dataset::new(Domain::Issues, vec![malformed, closed, open]);
        let all = DateFilter::default();

        let (_, skipped) = tally(&dataset, &TimestampField::Created, Granularity::Month, &all);
        assert_eq!(skipped, 1);

        let (counts, skipped) = tally(&dataset, &TimestampField::Closed, Granularity::Month, &all);
        assert_eq!(counts.len(), 1);
        assert_eq!(skipped, 0);

        let (_, skipped) = tally(
            &dataset,
            &TimestampField::named("release_date"),
            Granularity::Month,
            &all,
        );
        assert_eq!(skipped, 3);
    }

    #[test]
    fn test_date_filter_is_inclusive() {
        let dataset = prs(&[ts(2024, 1, 31, 23), ts(2024, 2, 1, 0), ts(2024, 3, 1, 0)]);
        let filter = DateFilter::new(Some(date(2024, 2, 1)), Some(date(2024, 3, 1)));

        let points =
            count_per_bucket_in(&dataset, &TimestampField::Created, Granularity::Month, &filter);
        assert_eq!(
            points,
            vec![
                MetricPoint::new(date(2024, 2, 1), 1.0),
                MetricPoint::new(date(2024, 3, 1), 1.0),
            ]
        );
    }

    #[test]
    fn test_distinct_counts() {
        let records = vec![
            EventRecord::new("1", 1, ts(2024, 5, 1, 0)).with_field("cntrb_id", "alice"),
            EventRecord::new("2", 1, ts(2024, 5, 9, 0)).with_field("cntrb_id", "alice"),
            EventRecord::new("3", 1, ts(2024, 5, 10, 0)).with_field("cntrb_id", "bob"),
            EventRecord::new("4", 1, ts(2024, 6, 2, 0)).with_field("cntrb_id", "bob"),
            EventRecord::new("5", 1, ts(2024, 6, 3, 0)),
        ];
        let dataset = Dataset::new(Domain::Contributions, records);

        let points = count_distinct_per_bucket(
            &dataset,
            &TimestampField::Created,
            "cntrb_id",
            Granularity::Month,
            &DateFilter::default(),
        );
        assert_eq!(
            points,
            vec![
                MetricPoint::new(date(2024, 5, 1), 2.0),
                MetricPoint::new(date(2024, 6, 1), 1.0),
            ]
        );
    }

    #[test]
    fn test_repeated_aggregation_is_identical() {
        let dataset = prs(&[ts(2024, 1, 15, 3), ts(2024, 2, 3, 22)]);
        let first = count_per_bucket(&dataset, &TimestampField::Created, Granularity::Week);
        let second = count_per_bucket(&dataset, &TimestampField::Created, Granularity::Week);
        assert_eq!(format!("{:?}", first), format!("{:?}", second));
    }
}
