//! Secondary-per-primary averages.
//!
//! Joins two datasets on a foreign key (review messages onto pull requests,
//! for example), counts secondary records per primary record, buckets the
//! primaries by one of their timestamps and averages the counts per bucket.
//!
//! Primaries without any secondary record stay in the join with no count.
//! They are excluded from the average, so a bucket in which no primary got
//! a response has no average at all rather than an average of zero.

use crate::types::{Dataset, Granularity, TimeBucket, TimestampField};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One primary record after the join.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRow {
    pub primary_id: String,
    pub bucket: TimeBucket,
    /// Number of secondary records pointing at this primary, if any
    pub secondary_count: Option<u64>,
}

/// Per-bucket summary of joined rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedAggregate {
    pub bucket: TimeBucket,
    /// Mean secondary count over primaries that have one
    pub average_secondary_count: Option<f64>,
    /// Primaries in the bucket
    pub primaries: usize,
    /// Primaries with at least one secondary record
    pub responded: usize,
}

/// Number of secondary records per foreign-key value.
pub fn count_by_foreign_key(secondary: &Dataset, foreign_key: &str) -> HashMap<String, u64> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut skipped = 0usize;

    for record in secondary.records() {
        match record.field(foreign_key).and_then(|v| v.as_key()) {
            Some(key) => *counts.entry(key).or_insert(0) += 1,
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!(
            domain = %secondary.domain(),
            foreign_key,
            skipped,
            "Secondary records without foreign key skipped"
        );
    }
    counts
}

/// Left-join secondary counts onto primary records.
///
/// Rows are ordered by bucket, then primary id. Primaries missing the
/// bucketing timestamp are skipped.
pub fn join_counts(
    primary: &Dataset,
    secondary: &Dataset,
    foreign_key: &str,
    time_field: &TimestampField,
    granularity: Granularity,
) -> Vec<JoinedRow> {
    let counts = count_by_foreign_key(secondary, foreign_key);

    let mut rows: Vec<JoinedRow> = primary
        .records()
        .iter()
        .filter_map(|record| {
            let ts = record.timestamp(time_field)?;
            Some(JoinedRow {
                primary_id: record.id.clone(),
                bucket: TimeBucket::containing(granularity, ts),
                secondary_count: counts.get(&record.id).copied(),
            })
        })
        .collect();

    let skipped = primary.len() - rows.len();
    if skipped > 0 {
        tracing::debug!(
            domain = %primary.domain(),
            field = %time_field,
            skipped,
            "Primary records without timestamp skipped in join"
        );
    }

    rows.sort_by(|a, b| {
        a.bucket
            .cmp(&b.bucket)
            .then_with(|| a.primary_id.cmp(&b.primary_id))
    });
    rows
}

/// Average the joined counts per bucket, ascending by bucket start.
pub fn average_per_bucket(rows: &[JoinedRow]) -> Vec<JoinedAggregate> {
    #[derive(Default)]
    struct Acc {
        primaries: usize,
        responded: usize,
        total: u64,
    }

    let mut buckets: BTreeMap<TimeBucket, Acc> = BTreeMap::new();
    for row in rows {
        let acc = buckets.entry(row.bucket).or_default();
        acc.primaries += 1;
        if let Some(count) = row.secondary_count {
            acc.responded += 1;
            acc.total += count;
        }
    }

    buckets
        .into_iter()
        .map(|(bucket, acc)| JoinedAggregate {
            bucket,
            average_secondary_count: (acc.responded > 0)
                .then(|| acc.total as f64 / acc.responded as f64),
            primaries: acc.primaries,
            responded: acc.responded,
        })
        .collect()
}

/// [`join_counts`] followed by [`average_per_bucket`].
pub fn average_secondary_per_bucket(
    primary: &Dataset,
    secondary: &Dataset,
    foreign_key: &str,
    time_field: &TimestampField,
    granularity: Granularity,
) -> Vec<JoinedAggregate> {
    let rows = join_counts(primary, secondary, foreign_key, time_field, granularity);
    average_per_bucket(&rows)
}
