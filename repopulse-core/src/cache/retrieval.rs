//! Polling retrieval of cached datasets
//!
//! Every chart needs the same sequence: request its dataset, wait until the
//! background producer has materialized it, and fall back to a neutral
//! "no data" state if the dataset is empty or the producer failed. This
//! module is that sequence, written once.
//!
//! Waiting is cooperative: a consumer that sees `Pending` sleeps for the
//! poll interval and asks again. Dropping the returned future stops polling
//! but leaves the producer run alone, since other consumers may share it.

use super::{CacheKey, CacheStatus, DatasetCache};
use crate::types::{Dataset, Domain, RepoId};
use std::time::Duration;
use tokio::time::Instant;

/// How consumers poll a pending dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between polls
    pub interval: Duration,
    /// Stop waiting after this long; `None` waits as long as the key is pending
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: None,
        }
    }
}

impl PollPolicy {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            max_wait: None,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

/// Why a consumer ended up without data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoDataReason {
    /// The dataset materialized with zero records
    Empty,
    /// The producer failed for this key
    ProducerFailed(String),
    /// The consumer stopped waiting before the dataset was ready
    Abandoned,
}

impl std::fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoDataReason::Empty => f.write_str("no records available"),
            NoDataReason::ProducerFailed(message) => write!(f, "data source failed: {}", message),
            NoDataReason::Abandoned => f.write_str("timed out waiting for data"),
        }
    }
}

/// Outcome of waiting on the cache.
#[derive(Debug, Clone)]
pub enum Retrieval<T = Dataset> {
    Ready(T),
    NoData(NoDataReason),
}

impl<T> Retrieval<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Retrieval::Ready(_))
    }

    /// Convert into a `Result`, with the no-data reason as the error.
    pub fn into_result(self) -> Result<T, NoDataReason> {
        match self {
            Retrieval::Ready(value) => Ok(value),
            Retrieval::NoData(reason) => Err(reason),
        }
    }
}

/// Wait for one dataset.
pub async fn fetch(
    cache: &DatasetCache,
    domain: Domain,
    repos: &[RepoId],
    policy: &PollPolicy,
) -> Retrieval {
    match fetch_all(cache, &[domain], repos, policy).await {
        Retrieval::Ready(mut datasets) => match datasets.pop() {
            Some(dataset) => Retrieval::Ready(dataset),
            None => Retrieval::NoData(NoDataReason::Empty),
        },
        Retrieval::NoData(reason) => Retrieval::NoData(reason),
    }
}

/// Wait for several datasets over the same repositories.
///
/// Datasets come back in the order of `domains`. Any failed or empty dataset
/// turns the whole retrieval into `NoData`, since the charts that combine
/// datasets cannot be drawn from a partial set.
pub async fn fetch_all(
    cache: &DatasetCache,
    domains: &[Domain],
    repos: &[RepoId],
    policy: &PollPolicy,
) -> Retrieval<Vec<Dataset>> {
    let keys: Vec<CacheKey> = domains.iter().map(|d| CacheKey::new(*d, repos)).collect();
    let started = Instant::now();
    let mut polls: u64 = 0;

    loop {
        polls += 1;
        let entries: Vec<_> = keys.iter().map(|key| cache.request_key(key)).collect();

        if let Some(failed) = entries.iter().find(|e| e.status == CacheStatus::Failed) {
            let message = failed.error.clone().unwrap_or_default();
            tracing::warn!(key = %failed.key, error = %message, "No data: producer failed");
            return Retrieval::NoData(NoDataReason::ProducerFailed(message));
        }

        if entries.iter().all(|e| e.is_ready()) {
            let datasets: Vec<Dataset> = entries.into_iter().filter_map(|e| e.value).collect();
            if datasets.len() != keys.len() || datasets.iter().any(Dataset::is_empty) {
                tracing::info!(domains = ?domains, "No data: dataset empty");
                return Retrieval::NoData(NoDataReason::Empty);
            }
            tracing::debug!(
                domains = ?domains,
                polls,
                waited_ms = started.elapsed().as_millis() as u64,
                "Datasets ready"
            );
            return Retrieval::Ready(datasets);
        }

        if let Some(max_wait) = policy.max_wait {
            if started.elapsed() >= max_wait {
                tracing::warn!(
                    domains = ?domains,
                    polls,
                    max_wait_ms = max_wait.as_millis() as u64,
                    "No data: gave up waiting for datasets"
                );
                return Retrieval::NoData(NoDataReason::Abandoned);
            }
        }

        tracing::trace!(domains = ?domains, polls, "Datasets pending; polling again");
        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::MemoryProducer;
    use crate::types::EventRecord;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tokio::runtime::Handle;

    fn fast() -> PollPolicy {
        PollPolicy::every(Duration::from_millis(5))
    }

    fn record(id: &str) -> EventRecord {
        EventRecord::new(id, 1, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_fetch_waits_for_ready() {
        let memory = MemoryProducer::new()
            .with_records(Domain::Issues, vec![record("i1"), record("i2")])
            .with_delay(Duration::from_millis(20));
        let cache = DatasetCache::new(Arc::new(memory), Handle::current());

        let dataset = fetch(&cache, Domain::Issues, &[1], &fast())
            .await
            .into_result()
            .unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_empty_dataset_is_no_data() {
        let cache = DatasetCache::new(Arc::new(MemoryProducer::new()), Handle::current());
        let result = fetch(&cache, Domain::Releases, &[1], &fast()).await;
        assert!(matches!(result, Retrieval::NoData(NoDataReason::Empty)));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_terminal() {
        let memory = MemoryProducer::new().with_failure(Domain::Commits, "query rejected");
        let cache = DatasetCache::new(Arc::new(memory), Handle::current());

        match fetch(&cache, Domain::Commits, &[1], &fast()).await {
            Retrieval::NoData(NoDataReason::ProducerFailed(message)) => {
                assert!(message.contains("query rejected"));
            }
            other => panic!("expected producer failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_abandons_after_max_wait() {
        let memory = MemoryProducer::new()
            .with_records(Domain::Issues, vec![record("i1")])
            .with_delay(Duration::from_millis(300));
        let cache = DatasetCache::new(Arc::new(memory), Handle::current());
        let policy = fast().with_max_wait(Duration::from_millis(20));

        let result = fetch(&cache, Domain::Issues, &[1], &policy).await;
        assert!(matches!(result, Retrieval::NoData(NoDataReason::Abandoned)));

        // Abandoning does not cancel the run; a later consumer still gets the data
        let later = fetch(&cache, Domain::Issues, &[1], &fast()).await;
        assert!(later.is_ready());
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_order() {
        let memory = MemoryProducer::new()
            .with_records(Domain::PullRequests, vec![record("pr")])
            .with_records(Domain::PrMessages, vec![record("m1"), record("m2")]);
        let cache = DatasetCache::new(Arc::new(memory), Handle::current());

        let datasets = fetch_all(
            &cache,
            &[Domain::PullRequests, Domain::PrMessages],
            &[1],
            &fast(),
        )
        .await
        .into_result()
        .unwrap();

        assert_eq!(datasets[0].domain(), Domain::PullRequests);
        assert_eq!(datasets[1].len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_all_with_one_empty_is_no_data() {
        let memory =
            MemoryProducer::new().with_records(Domain::PullRequests, vec![record("pr")]);
        let cache = DatasetCache::new(Arc::new(memory), Handle::current());

        let result = fetch_all(
            &cache,
            &[Domain::PullRequests, Domain::PrMessages],
            &[1],
            &fast(),
        )
        .await;
        assert!(matches!(result, Retrieval::NoData(NoDataReason::Empty)));
    }

    #[tokio::test]
    async fn test_concurrent_consumers_share_one_run() {
        let memory = Arc::new(
            MemoryProducer::new()
                .with_records(Domain::Issues, vec![record("i1")])
                .with_delay(Duration::from_millis(20)),
        );
        let cache = DatasetCache::new(memory.clone(), Handle::current());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                fetch(&cache, Domain::Issues, &[1], &fast()).await
            }));
        }

        let mut datasets = Vec::new();
        for handle in handles {
            datasets.push(handle.await.unwrap().into_result().unwrap());
        }

        assert_eq!(memory.runs(Domain::Issues), 1);
        assert!(datasets.windows(2).all(|w| w[0].ptr_eq(&w[1])));
    }
}
