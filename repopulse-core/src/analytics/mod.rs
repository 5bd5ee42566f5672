//! Analytics module for repopulse
//!
//! Pure aggregations from immutable datasets to ordered series:
//! - [`bucket`]: event counts (and distinct counts) per day/week/month/year
//! - [`open_interval`]: how many items are open on each day of a range
//! - [`ratio`]: per-day closed/open ratio with gaps for zero denominators
//! - [`join`]: secondary-record counts joined onto primary records and averaged per bucket
//! - [`series`]: ordered `(x, y)` series handed to the rendering layer
//!
//! Every function here takes its datasets by shared reference, never fails on
//! empty input, and skips malformed records (missing the timestamp it reads)
//! instead of aborting. Calling the same function twice on the same dataset
//! yields identical output.

pub mod bucket;
pub mod join;
pub mod open_interval;
pub mod ratio;
pub mod series;

pub use bucket::{count_distinct_per_bucket, count_per_bucket, count_per_bucket_in};
pub use join::{
    average_per_bucket, average_secondary_per_bucket, count_by_foreign_key, join_counts,
    JoinedAggregate, JoinedRow,
};
pub use open_interval::{observed_range, open_counts, open_counts_in, open_counts_naive};
pub use ratio::{closure_ratio, RatioPoint};
pub use series::{ChartData, Series, SeriesKind, SeriesPoint};
