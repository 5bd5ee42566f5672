//! Core domain types for repopulse
//!
//! These types describe raw community events as they arrive from a producer,
//! the immutable datasets the cache hands out, and the time buckets and
//! points the aggregations produce.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Domain** | A category of event record (pull requests, issues, commits, ...) |
//! | **EventRecord** | One raw event: an id, a repository, a creation and optional closure time |
//! | **Dataset** | All records of one domain for a fixed set of repositories |
//! | **Bucket** | A half-open `[start, end)` calendar interval used for grouping |
//! | **MetricPoint** | One aggregated value labelled by a bucket start or a day |

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;

/// Repository identifier as used by the upstream source.
pub type RepoId = i64;

// ============================================
// Domain
// ============================================

/// Category of event record a dataset holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Pull requests (change requests); `closed` is the close or merge time
    PullRequests,
    /// Issues; `closed` is the close time
    Issues,
    /// Commits; `created` is the commit time, `author_date` the authoring time
    Commits,
    /// Releases; `release_date` carries the publication time
    Releases,
    /// Review comments and messages on pull requests
    PrMessages,
    /// Issue assignment events; `assign_date` carries the assignment time
    IssueAssignments,
    /// Contribution actions by individual contributors
    Contributions,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::PullRequests => "pull_requests",
            Domain::Issues => "issues",
            Domain::Commits => "commits",
            Domain::Releases => "releases",
            Domain::PrMessages => "pr_messages",
            Domain::IssueAssignments => "issue_assignments",
            Domain::Contributions => "contributions",
        }
    }

    /// All known domains, in a stable order.
    pub fn all() -> &'static [Domain] {
        &[
            Domain::PullRequests,
            Domain::Issues,
            Domain::Commits,
            Domain::Releases,
            Domain::PrMessages,
            Domain::IssueAssignments,
            Domain::Contributions,
        ]
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::all()
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| Error::UnknownDomain(s.to_string()))
    }
}

// ============================================
// Event records
// ============================================

/// Value of a domain-specific field on an event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Timestamp(DateTime<Utc>),
    Text(String),
    Null,
}

impl FieldValue {
    /// Timestamp view of the value; text is accepted if it parses as RFC 3339.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            FieldValue::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Key used when grouping or joining on this value. `Null` has no key.
    pub fn as_key(&self) -> Option<String> {
        match self {
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Timestamp(ts) => Some(ts.to_rfc3339()),
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Null => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

/// One raw event as produced by the upstream query layer.
///
/// Records are immutable once they are part of a [`Dataset`]. `created` is
/// optional only so that malformed upstream rows can be carried and skipped
/// by the aggregations instead of failing the whole dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Identifier of the item (pull request id, issue id, commit hash, ...)
    pub id: String,
    /// Repository the event belongs to
    pub repo_id: RepoId,
    /// When the item was created
    pub created: Option<DateTime<Utc>>,
    /// When the item was closed; absent means still open
    #[serde(default)]
    pub closed: Option<DateTime<Utc>>,
    /// Domain-specific fields
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl EventRecord {
    pub fn new(id: impl Into<String>, repo_id: RepoId, created: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            repo_id,
            created: Some(created),
            closed: None,
            fields: BTreeMap::new(),
        }
    }

    /// Set the closure time.
    pub fn closed_at(mut self, closed: DateTime<Utc>) -> Self {
        self.closed = Some(closed);
        self
    }

    /// Attach a domain field.
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Read the timestamp selected by `field`.
    pub fn timestamp(&self, field: &TimestampField) -> Option<DateTime<Utc>> {
        match field {
            TimestampField::Created => self.created,
            TimestampField::Closed => self.closed,
            TimestampField::Named(name) => self.fields.get(name).and_then(FieldValue::as_timestamp),
        }
    }
}

/// Selects which timestamp of a record an aggregation reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimestampField {
    Created,
    Closed,
    /// A timestamp stored in [`EventRecord::fields`]
    Named(String),
}

impl TimestampField {
    pub fn named(name: &str) -> Self {
        TimestampField::Named(name.to_string())
    }
}

impl fmt::Display for TimestampField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampField::Created => f.write_str("created"),
            TimestampField::Closed => f.write_str("closed"),
            TimestampField::Named(name) => f.write_str(name),
        }
    }
}

// ============================================
// Dataset
// ============================================

/// Immutable collection of records for one domain.
///
/// Cloning is cheap and shares the underlying records, which is what lets the
/// cache hand the same value to every consumer.
#[derive(Debug, Clone)]
pub struct Dataset {
    domain: Domain,
    records: Arc<[EventRecord]>,
}

impl Dataset {
    pub fn new(domain: Domain, records: Vec<EventRecord>) -> Self {
        Self {
            domain,
            records: records.into(),
        }
    }

    pub fn empty(domain: Domain) -> Self {
        Self::new(domain, Vec::new())
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when both handles point at the same materialized records.
    pub fn ptr_eq(&self, other: &Dataset) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }
}

// ============================================
// Time buckets
// ============================================

/// Width of an aggregation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
    Year,
}

impl Granularity {
    /// Single-letter code (D, W, M, Y).
    pub fn code(&self) -> &'static str {
        match self {
            Granularity::Day => "D",
            Granularity::Week => "W",
            Granularity::Month => "M",
            Granularity::Year => "Y",
        }
    }

    /// Canonical first day of the bucket containing `date`.
    ///
    /// Weeks start on Monday, months on the 1st, years on January 1st.
    pub fn truncate(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
            Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    /// First day of the bucket after the one starting at `start`.
    pub fn next_start(&self, start: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => start + Duration::days(1),
            Granularity::Week => start + Duration::days(7),
            Granularity::Month => {
                let (year, month) = if start.month() == 12 {
                    (start.year() + 1, 1)
                } else {
                    (start.year(), start.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(start)
            }
            Granularity::Year => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1).unwrap_or(start),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "d" | "day" | "daily" => Ok(Granularity::Day),
            "w" | "week" | "weekly" => Ok(Granularity::Week),
            "m" | "month" | "monthly" => Ok(Granularity::Month),
            "y" | "year" | "yearly" => Ok(Granularity::Year),
            _ => Err(Error::InvalidGranularity(s.to_string())),
        }
    }
}

/// A half-open `[start, end)` calendar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TimeBucket {
    pub granularity: Granularity,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeBucket {
    /// The bucket of the given width that contains `ts` (UTC).
    pub fn containing(granularity: Granularity, ts: DateTime<Utc>) -> Self {
        Self::containing_date(granularity, ts.date_naive())
    }

    pub fn containing_date(granularity: Granularity, date: NaiveDate) -> Self {
        let start = granularity.truncate(date);
        Self {
            granularity,
            start,
            end: granularity.next_start(start),
        }
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DayRange {
    pub fn new(first: NaiveDate, last: NaiveDate) -> Self {
        Self { first, last }
    }

    /// Number of days in the range; zero if `last < first`.
    pub fn len(&self) -> usize {
        let days = (self.last - self.first).num_days() + 1;
        days.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate every day in the range in ascending order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let first = self.first;
        (0..self.len() as i64).map(move |offset| first + Duration::days(offset))
    }
}

/// Optional inclusive bounds on the timestamp an aggregation reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateFilter {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn accepts(&self, ts: DateTime<Utc>) -> bool {
        let date = ts.date_naive();
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

// ============================================
// Aggregated points
// ============================================

/// One aggregated datum per bucket or per day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricPoint {
    /// Bucket start or day
    pub date: NaiveDate,
    pub value: f64,
}

impl MetricPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}
