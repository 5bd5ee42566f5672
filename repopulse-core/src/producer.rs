//! Dataset producers
//!
//! A producer turns a domain and a set of repositories into a [`Dataset`].
//! The cache invokes producers in the background, at most once per key at a
//! time, on tokio's blocking pool, so implementations may do blocking I/O.
//!
//! Built-in producers:
//! - [`crate::db::SqliteProducer`]: reads a local SQLite event snapshot
//! - [`MemoryProducer`]: fixed in-memory records, for tests and demos

use crate::error::{Error, Result};
use crate::types::{Dataset, Domain, EventRecord, RepoId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Source of raw event records for the dataset cache.
///
/// Implementations must be idempotent: the same domain and repository set
/// yields the same records, so re-running after an invalidation is safe.
pub trait Producer: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &str {
        "producer"
    }

    /// Materialize every record of `domain` belonging to `repos`.
    ///
    /// `repos` is sorted and free of duplicates.
    fn produce(&self, domain: Domain, repos: &[RepoId]) -> Result<Dataset>;
}

/// Producer over a fixed set of in-memory records.
#[derive(Default)]
pub struct MemoryProducer {
    records: HashMap<Domain, Vec<EventRecord>>,
    failures: HashMap<Domain, String>,
    delay: Option<Duration>,
    runs: Mutex<HashMap<Domain, usize>>,
    total_runs: AtomicUsize,
}

impl MemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add records for a domain.
    pub fn with_records(mut self, domain: Domain, records: Vec<EventRecord>) -> Self {
        self.records.entry(domain).or_default().extend(records);
        self
    }

    /// Make every run for `domain` fail with `message`.
    pub fn with_failure(mut self, domain: Domain, message: &str) -> Self {
        self.failures.insert(domain, message.to_string());
        self
    }

    /// Sleep this long before returning, to simulate a slow upstream query.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `domain` has been produced.
    pub fn runs(&self, domain: Domain) -> usize {
        self.runs
            .lock()
            .unwrap()
            .get(&domain)
            .copied()
            .unwrap_or(0)
    }

    /// Number of producer runs across all domains.
    pub fn total_runs(&self) -> usize {
        self.total_runs.load(Ordering::SeqCst)
    }
}

impl Producer for MemoryProducer {
    fn name(&self) -> &str {
        "memory"
    }

    fn produce(&self, domain: Domain, repos: &[RepoId]) -> Result<Dataset> {
        *self.runs.lock().unwrap().entry(domain).or_insert(0) += 1;
        self.total_runs.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if let Some(message) = self.failures.get(&domain) {
            return Err(Error::producer(domain, message.clone()));
        }

        let records = self
            .records
            .get(&domain)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| repos.binary_search(&r.repo_id).is_ok())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(Dataset::new(domain, records))
    }
}
