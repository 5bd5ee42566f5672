//! Database layer for repopulse
//!
//! A local SQLite snapshot of upstream events:
//! - Schema migrations
//! - Repository pattern for inserts and queries
//! - JSON-lines import
//! - [`SqliteProducer`], which serves cached datasets from the snapshot

pub mod import;
pub mod repo;
pub mod schema;

pub use import::ImportSummary;
pub use repo::{Database, DomainSummary, ImportRun};

use crate::error::{Error, Result};
use crate::producer::Producer;
use crate::types::{Dataset, Domain, RepoId};
use std::path::Path;
use std::sync::Arc;

/// Producer that reads datasets from a [`Database`].
#[derive(Clone)]
pub struct SqliteProducer {
    db: Arc<Database>,
}

impl SqliteProducer {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Open (and migrate) the snapshot at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::open(path)?;
        db.migrate()?;
        Ok(Self::new(Arc::new(db)))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl Producer for SqliteProducer {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn produce(&self, domain: Domain, repos: &[RepoId]) -> Result<Dataset> {
        let records = self
            .db
            .load_records(domain, repos)
            .map_err(|e| Error::producer(domain, e.to_string()))?;
        tracing::debug!(
            domain = %domain,
            repos = ?repos,
            records = records.len(),
            "Loaded records from snapshot"
        );
        Ok(Dataset::new(domain, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventRecord;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[test]
    fn test_sqlite_producer_reads_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("events.db");
        let producer = SqliteProducer::open(&path).unwrap();

        let created = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        producer
            .database()
            .upsert_records(
                Domain::Releases,
                &[
                    EventRecord::new("v1", 1, created),
                    EventRecord::new("v2", 2, created),
                ],
            )
            .unwrap();

        let dataset = producer.produce(Domain::Releases, &[2]).unwrap();
        assert_eq!(dataset.domain(), Domain::Releases);
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records()[0].id, "v2");
    }

    #[test]
    fn test_sqlite_producer_error_is_producer_failure() {
        let db = Database::open_in_memory().unwrap();
        // No migrations: the events table does not exist
        let producer = SqliteProducer::new(Arc::new(db));

        let err = producer.produce(Domain::Issues, &[1]).unwrap_err();
        assert!(matches!(err, Error::Producer { .. }));
        assert!(err.to_string().contains("issues"));
    }
}
