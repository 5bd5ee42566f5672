//! Dataset cache
//!
//! Keyed store of datasets that are produced once in the background and then
//! read many times by concurrent consumers.
//!
//! ## Lifecycle of an entry
//!
//! ```text
//!   (absent) ──request/trigger──▶ Pending ──producer Ok──▶ Ready (immutable)
//!                                    │
//!                                    └────producer Err/panic──▶ Failed
//!   Failed ──trigger──▶ Pending        any ──invalidate──▶ (absent)
//! ```
//!
//! - At most one producer run is in flight per key. The `Pending` entry is
//!   installed under the write lock before the run is spawned, so concurrent
//!   requests for the same key observe it instead of starting another run.
//! - A `Ready` value is never mutated. Invalidation removes the whole entry;
//!   a run that completes for an invalidated entry is discarded.
//! - Consumers never block on a producer. They read the current entry and
//!   re-poll (see [`retrieval`]).

pub mod retrieval;

pub use retrieval::{fetch, fetch_all, NoDataReason, PollPolicy, Retrieval};

use crate::error::{Error, Result};
use crate::producer::Producer;
use crate::types::{Dataset, Domain, RepoId};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::runtime::Handle;
use uuid::Uuid;

// ============================================
// Keys and entries
// ============================================

/// Identity of a dataset instance: a domain plus a sorted repository set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    domain: Domain,
    repos: Vec<RepoId>,
}

impl CacheKey {
    /// Build a key; repository order and duplicates do not matter.
    pub fn new(domain: Domain, repos: &[RepoId]) -> Self {
        let mut repos = repos.to_vec();
        repos.sort_unstable();
        repos.dedup();
        Self { domain, repos }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn repos(&self) -> &[RepoId] {
        &self.repos
    }

    /// Short stable hash of the key, used in log fields.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.domain.as_str().as_bytes());
        for repo in &self.repos {
            hasher.update(b":");
            hasher.update(repo.to_string().as_bytes());
        }
        hex::encode(&hasher.finalize()[..6])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.domain)?;
        for (i, repo) in self.repos.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", repo)?;
        }
        f.write_str("]")
    }
}

/// Status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// A producer run is in flight
    Pending,
    /// The dataset is materialized and immutable
    Ready,
    /// The producer failed; terminal until the key is re-triggered
    Failed,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Pending => "pending",
            CacheStatus::Ready => "ready",
            CacheStatus::Failed => "failed",
        }
    }
}

/// Snapshot of one cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub status: CacheStatus,
    /// Present only when `status` is `Ready`
    pub value: Option<Dataset>,
    /// When the producer run finished (Ready or Failed)
    pub produced_at: Option<DateTime<Utc>>,
    /// Producer error message when `status` is `Failed`
    pub error: Option<String>,
}

impl CacheEntry {
    fn pending(key: CacheKey) -> Self {
        Self {
            key,
            status: CacheStatus::Pending,
            value: None,
            produced_at: None,
            error: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == CacheStatus::Ready
    }
}

/// Identity of a cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheId(Uuid);

impl CacheId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CacheId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Counters describing cache activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls to `request`
    pub requests: u64,
    /// Requests answered by a `Ready` entry
    pub hits: u64,
    /// Producer runs started
    pub producer_runs: u64,
    /// Producer runs that failed or panicked
    pub failures: u64,
    /// Entries currently pending
    pub pending: usize,
    /// Entries currently ready
    pub ready: usize,
    /// Entries currently failed
    pub failed: usize,
}

// ============================================
// Cache
// ============================================

struct Slot {
    entry: CacheEntry,
    generation: u64,
}

struct CacheInner {
    id: CacheId,
    producer: Arc<dyn Producer>,
    runtime: Handle,
    entries: RwLock<HashMap<CacheKey, Slot>>,
    next_generation: AtomicU64,
    requests: AtomicU64,
    hits: AtomicU64,
    producer_runs: AtomicU64,
    failures: AtomicU64,
}

/// Handle to a process-wide dataset cache.
///
/// Construct once at startup and clone the handle into every consumer; all
/// clones share the same entries.
#[derive(Clone)]
pub struct DatasetCache {
    inner: Arc<CacheInner>,
}

impl DatasetCache {
    /// Create a cache with a fresh identity. Producer runs are spawned on `runtime`.
    pub fn new(producer: Arc<dyn Producer>, runtime: Handle) -> Self {
        Self::with_id(CacheId::new(), producer, runtime)
    }

    /// Create a cache with an explicit identity.
    pub fn with_id(id: CacheId, producer: Arc<dyn Producer>, runtime: Handle) -> Self {
        tracing::info!(cache_id = %id, producer = producer.name(), "Dataset cache created");
        Self {
            inner: Arc::new(CacheInner {
                id,
                producer,
                runtime,
                entries: RwLock::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                requests: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                producer_runs: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    /// Create a cache on the runtime of the calling context.
    pub fn on_current_runtime(producer: Arc<dyn Producer>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("no tokio runtime available: {}", e)))?;
        Ok(Self::new(producer, runtime))
    }

    pub fn id(&self) -> CacheId {
        self.inner.id
    }

    /// Current entry for `key`, without triggering production.
    ///
    /// `None` is a cache miss.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entries = self.inner.entries.read().unwrap();
        entries.get(key).map(|slot| slot.entry.clone())
    }

    /// Current entry for a domain and repository set, starting production if absent.
    ///
    /// Never blocks on the producer: a fresh key comes back `Pending`.
    pub fn request(&self, domain: Domain, repos: &[RepoId]) -> CacheEntry {
        self.request_key(&CacheKey::new(domain, repos))
    }

    /// Same as [`request`](Self::request) for a prebuilt key.
    pub fn request_key(&self, key: &CacheKey) -> CacheEntry {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = self.get(key) {
            if entry.is_ready() {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
            }
            return entry;
        }

        self.ensure_run(key, false)
    }

    /// Ensure a producer run exists for `key` unless one is pending or ready.
    ///
    /// Unlike `request`, this re-runs a key whose last run failed.
    pub fn trigger(&self, key: &CacheKey) -> CacheEntry {
        self.ensure_run(key, true)
    }

    /// Drop the entry for `key`. The next request starts a fresh producer run.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.inner.entries.write().unwrap().remove(key).is_some();
        if removed {
            tracing::info!(key = %key, fingerprint = %key.fingerprint(), "Dataset invalidated");
        }
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self.inner.entries.write().unwrap();
        let count = entries.len();
        entries.clear();
        tracing::info!(cache_id = %self.inner.id, count, "Dataset cache cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            requests: self.inner.requests.load(Ordering::Relaxed),
            hits: self.inner.hits.load(Ordering::Relaxed),
            producer_runs: self.inner.producer_runs.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
            ..Default::default()
        };
        for slot in self.inner.entries.read().unwrap().values() {
            match slot.entry.status {
                CacheStatus::Pending => stats.pending += 1,
                CacheStatus::Ready => stats.ready += 1,
                CacheStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    fn ensure_run(&self, key: &CacheKey, rerun_failed: bool) -> CacheEntry {
        let generation = {
            let mut entries = self.inner.entries.write().unwrap();
            if let Some(slot) = entries.get(key) {
                let rerun = rerun_failed && slot.entry.status == CacheStatus::Failed;
                if !rerun {
                    return slot.entry.clone();
                }
            }

            let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
            entries.insert(
                key.clone(),
                Slot {
                    entry: CacheEntry::pending(key.clone()),
                    generation,
                },
            );
            generation
        };

        self.spawn_producer(key.clone(), generation);
        CacheEntry::pending(key.clone())
    }

    fn spawn_producer(&self, key: CacheKey, generation: u64) {
        let inner = Arc::clone(&self.inner);
        inner.producer_runs.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            key = %key,
            fingerprint = %key.fingerprint(),
            generation,
            "Starting producer run"
        );

        self.inner.runtime.spawn(async move {
            let started = Instant::now();
            let producer = Arc::clone(&inner.producer);
            let run_key = key.clone();

            let joined = tokio::task::spawn_blocking(move || {
                producer.produce(run_key.domain(), run_key.repos())
            })
            .await;

            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::producer(key.domain(), format!("producer panicked: {}", e))),
            };

            inner.complete(&key, generation, outcome, started);
        });
    }
}

impl CacheInner {
    fn complete(
        &self,
        key: &CacheKey,
        generation: u64,
        outcome: Result<Dataset>,
        started: Instant,
    ) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let mut entries = self.entries.write().unwrap();

        let slot = match entries.get_mut(key) {
            Some(slot) if slot.generation == generation => slot,
            _ => {
                tracing::debug!(
                    key = %key,
                    generation,
                    "Discarding producer result for invalidated entry"
                );
                return;
            }
        };

        let produced_at = Some(Utc::now());
        match outcome {
            Ok(dataset) => {
                tracing::info!(
                    key = %key,
                    fingerprint = %key.fingerprint(),
                    records = dataset.len(),
                    elapsed_ms,
                    "Dataset ready"
                );
                slot.entry = CacheEntry {
                    key: key.clone(),
                    status: CacheStatus::Ready,
                    value: Some(dataset),
                    produced_at,
                    error: None,
                };
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %key,
                    fingerprint = %key.fingerprint(),
                    error = %e,
                    elapsed_ms,
                    "Dataset producer failed"
                );
                slot.entry = CacheEntry {
                    key: key.clone(),
                    status: CacheStatus::Failed,
                    value: None,
                    produced_at,
                    error: Some(e.to_string()),
                };
            }
        }
    }
}
