//! Dashboard charts
//!
//! Each chart names the datasets it needs, waits for them through the cache
//! retrieval primitive, runs the matching aggregations and returns
//! [`ChartData`]. A chart never fails: an empty, failed or abandoned dataset
//! becomes [`ChartData::NoData`].
//!
//! | Chart | Domains | Aggregation |
//! |-------|---------|-------------|
//! | `closure-ratio` | pull requests | created/closed per bucket, open and closed/open per day |
//! | `release-frequency` | releases | releases per bucket on `release_date` |
//! | `issue-assignments` | issue assignments | assignments per bucket on `assign_date` |
//! | `review-comments` | pull requests, PR messages | monthly average messages per responded PR |
//! | `commit-frequency` | commits | distinct `author_timestamp` per month on `author_date` |
//! | `contributors` | contributions | distinct `cntrb_id` per month on `created` |

use crate::analytics::{
    average_secondary_per_bucket, closure_ratio as ratio_per_day, count_distinct_per_bucket,
    count_per_bucket, open_counts, ChartData, Series,
};
use crate::cache::{fetch, fetch_all, DatasetCache, NoDataReason, PollPolicy, Retrieval};
use crate::error::Error;
use crate::types::{DateFilter, Domain, Granularity, RepoId, TimestampField};
use std::fmt;
use std::time::Instant;

/// Foreign key on PR messages pointing at the pull request.
pub const PULL_REQUEST_KEY: &str = "pull_request_id";

/// The charts the dashboard can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visualization {
    ClosureRatio,
    ReleaseFrequency,
    IssueAssignments,
    ReviewCommentAverage,
    CommitFrequency,
    ContributorCount,
}

impl Visualization {
    pub fn all() -> &'static [Visualization] {
        &[
            Visualization::ClosureRatio,
            Visualization::ReleaseFrequency,
            Visualization::IssueAssignments,
            Visualization::ReviewCommentAverage,
            Visualization::CommitFrequency,
            Visualization::ContributorCount,
        ]
    }

    /// Identifier used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Visualization::ClosureRatio => "closure-ratio",
            Visualization::ReleaseFrequency => "release-frequency",
            Visualization::IssueAssignments => "issue-assignments",
            Visualization::ReviewCommentAverage => "review-comments",
            Visualization::CommitFrequency => "commit-frequency",
            Visualization::ContributorCount => "contributors",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Visualization::ClosureRatio => "Pull request closure ratio",
            Visualization::ReleaseFrequency => "Releases",
            Visualization::IssueAssignments => "Issue assignments",
            Visualization::ReviewCommentAverage => "Average review comments per responded PR",
            Visualization::CommitFrequency => "Commits per month",
            Visualization::ContributorCount => "Active contributors per month",
        }
    }

    /// Datasets the chart reads, in the order it reads them.
    pub fn domains(&self) -> &'static [Domain] {
        match self {
            Visualization::ClosureRatio => &[Domain::PullRequests],
            Visualization::ReleaseFrequency => &[Domain::Releases],
            Visualization::IssueAssignments => &[Domain::IssueAssignments],
            Visualization::ReviewCommentAverage => &[Domain::PullRequests, Domain::PrMessages],
            Visualization::CommitFrequency => &[Domain::Commits],
            Visualization::ContributorCount => &[Domain::Contributions],
        }
    }

    /// Whether the interval selector changes this chart.
    pub fn uses_granularity(&self) -> bool {
        matches!(
            self,
            Visualization::ClosureRatio
                | Visualization::ReleaseFrequency
                | Visualization::IssueAssignments
        )
    }

    /// Whether the date filter changes this chart.
    pub fn uses_date_filter(&self) -> bool {
        matches!(
            self,
            Visualization::CommitFrequency | Visualization::ContributorCount
        )
    }
}

impl fmt::Display for Visualization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Visualization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Visualization::all()
            .iter()
            .copied()
            .find(|v| v.name() == normalized)
            .ok_or_else(|| Error::UnknownVisualization(s.to_string()))
    }
}

/// Parameters shared by every chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRequest {
    pub repos: Vec<RepoId>,
    pub granularity: Granularity,
    pub filter: DateFilter,
}

impl ChartRequest {
    pub fn new(repos: Vec<RepoId>, granularity: Granularity) -> Self {
        Self {
            repos,
            granularity,
            filter: DateFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: DateFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Draw any chart.
pub async fn render_chart(
    cache: &DatasetCache,
    visualization: Visualization,
    request: &ChartRequest,
    policy: &PollPolicy,
) -> ChartData {
    let started = Instant::now();
    let repos = &request.repos;

    let chart = match visualization {
        Visualization::ClosureRatio => {
            closure_ratio(cache, repos, request.granularity, policy).await
        }
        Visualization::ReleaseFrequency => {
            release_frequency(cache, repos, request.granularity, policy).await
        }
        Visualization::IssueAssignments => {
            issue_assignments(cache, repos, request.granularity, policy).await
        }
        Visualization::ReviewCommentAverage => review_comment_average(cache, repos, policy).await,
        Visualization::CommitFrequency => {
            commit_frequency(cache, repos, &request.filter, policy).await
        }
        Visualization::ContributorCount => {
            contributor_count(cache, repos, &request.filter, policy).await
        }
    };

    tracing::info!(
        chart = %visualization,
        repos = ?repos,
        ready = chart.is_ready(),
        series = chart.series().len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Chart rendered"
    );
    chart
}

/// Pull requests created and closed per bucket, open per day, and the
/// daily ratio of closures to open pull requests.
pub async fn closure_ratio(
    cache: &DatasetCache,
    repos: &[RepoId],
    granularity: Granularity,
    policy: &PollPolicy,
) -> ChartData {
    let title = Visualization::ClosureRatio.title();
    let prs = match fetch(cache, Domain::PullRequests, repos, policy).await {
        Retrieval::Ready(dataset) => dataset,
        Retrieval::NoData(reason) => return ChartData::no_data(title, &reason),
    };

    let created = count_per_bucket(&prs, &TimestampField::Created, granularity);
    let closed = count_per_bucket(&prs, &TimestampField::Closed, granularity);
    let open = open_counts(&prs);
    let closed_daily = count_per_bucket(&prs, &TimestampField::Closed, Granularity::Day);
    let ratio = ratio_per_day(&closed_daily, &open);

    ChartData::Ready {
        title: title.to_string(),
        granularity,
        series: vec![
            Series::bucketed("Created", granularity, &created),
            Series::bucketed("Closed", granularity, &closed),
            Series::daily("Open", &open),
            Series::from_ratio("Closed/Open ratio", &ratio),
        ],
    }
}

/// Releases per bucket.
pub async fn release_frequency(
    cache: &DatasetCache,
    repos: &[RepoId],
    granularity: Granularity,
    policy: &PollPolicy,
) -> ChartData {
    bucket_chart(
        cache,
        Visualization::ReleaseFrequency,
        repos,
        TimestampField::named("release_date"),
        granularity,
        policy,
    )
    .await
}

/// Issue assignments per bucket.
pub async fn issue_assignments(
    cache: &DatasetCache,
    repos: &[RepoId],
    granularity: Granularity,
    policy: &PollPolicy,
) -> ChartData {
    bucket_chart(
        cache,
        Visualization::IssueAssignments,
        repos,
        TimestampField::named("assign_date"),
        granularity,
        policy,
    )
    .await
}

async fn bucket_chart(
    cache: &DatasetCache,
    visualization: Visualization,
    repos: &[RepoId],
    field: TimestampField,
    granularity: Granularity,
    policy: &PollPolicy,
) -> ChartData {
    let title = visualization.title();
    let domain = visualization.domains()[0];
    let dataset = match fetch(cache, domain, repos, policy).await {
        Retrieval::Ready(dataset) => dataset,
        Retrieval::NoData(reason) => return ChartData::no_data(title, &reason),
    };

    let points = count_per_bucket(&dataset, &field, granularity);
    ChartData::Ready {
        title: title.to_string(),
        granularity,
        series: vec![Series::bucketed(title, granularity, &points)],
    }
}

/// Average number of review messages per pull request, by month of creation.
///
/// Only pull requests with at least one message count towards the average;
/// a month where no pull request got a message shows as a gap.
pub async fn review_comment_average(
    cache: &DatasetCache,
    repos: &[RepoId],
    policy: &PollPolicy,
) -> ChartData {
    let visualization = Visualization::ReviewCommentAverage;
    let title = visualization.title();
    let datasets = match fetch_all(cache, visualization.domains(), repos, policy).await {
        Retrieval::Ready(datasets) => datasets,
        Retrieval::NoData(reason) => return ChartData::no_data(title, &reason),
    };
    let [prs, messages] = datasets.as_slice() else {
        return ChartData::no_data(title, &NoDataReason::Empty);
    };

    let aggregates = average_secondary_per_bucket(
        prs,
        messages,
        PULL_REQUEST_KEY,
        &TimestampField::Created,
        Granularity::Month,
    );
    ChartData::Ready {
        title: title.to_string(),
        granularity: Granularity::Month,
        series: vec![Series::from_joined("Average comments", &aggregates)],
    }
}

/// Distinct commits per month, keyed on author date.
pub async fn commit_frequency(
    cache: &DatasetCache,
    repos: &[RepoId],
    filter: &DateFilter,
    policy: &PollPolicy,
) -> ChartData {
    distinct_chart(
        cache,
        Visualization::CommitFrequency,
        repos,
        TimestampField::named("author_date"),
        "author_timestamp",
        filter,
        policy,
    )
    .await
}

/// Distinct contributors per month.
pub async fn contributor_count(
    cache: &DatasetCache,
    repos: &[RepoId],
    filter: &DateFilter,
    policy: &PollPolicy,
) -> ChartData {
    distinct_chart(
        cache,
        Visualization::ContributorCount,
        repos,
        TimestampField::Created,
        "cntrb_id",
        filter,
        policy,
    )
    .await
}

async fn distinct_chart(
    cache: &DatasetCache,
    visualization: Visualization,
    repos: &[RepoId],
    field: TimestampField,
    value_field: &str,
    filter: &DateFilter,
    policy: &PollPolicy,
) -> ChartData {
    let title = visualization.title();
    let domain = visualization.domains()[0];
    let dataset = match fetch(cache, domain, repos, policy).await {
        Retrieval::Ready(dataset) => dataset,
        Retrieval::NoData(reason) => return ChartData::no_data(title, &reason),
    };

    let points =
        count_distinct_per_bucket(&dataset, &field, value_field, Granularity::Month, filter);
    ChartData::Ready {
        title: title.to_string(),
        granularity: Granularity::Month,
        series: vec![Series::bucketed(title, Granularity::Month, &points)],
    }
}
