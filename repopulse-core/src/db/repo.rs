//! Database repository layer
//!
//! Insert and query operations over the event snapshot.

use crate::error::Result;
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// Stored record counts for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSummary {
    pub domain: Domain,
    pub records: i64,
    pub repos: i64,
}

/// One past JSON-lines import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRun {
    pub domain: Domain,
    pub source_path: String,
    pub imported: i64,
    pub skipped: i64,
    pub imported_at: DateTime<Utc>,
}

/// Database handle with a single guarded connection
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Event operations
    // ============================================

    /// Insert or replace one event record
    pub fn upsert_record(&self, domain: Domain, record: &EventRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::upsert_with(&conn, domain, record)
    }

    /// Insert or replace many event records in one transaction
    pub fn upsert_records(&self, domain: Domain, records: &[EventRecord]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for record in records {
            Self::upsert_with(&tx, domain, record)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn upsert_with(conn: &Connection, domain: Domain, record: &EventRecord) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO events (domain, id, repo_id, created_at, closed_at, fields)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(domain, id) DO UPDATE SET
                repo_id = excluded.repo_id,
                created_at = excluded.created_at,
                closed_at = excluded.closed_at,
                fields = excluded.fields
            "#,
            params![
                domain.as_str(),
                record.id,
                record.repo_id,
                record.created.map(|ts| ts.to_rfc3339()),
                record.closed.map(|ts| ts.to_rfc3339()),
                serde_json::to_string(&record.fields)?,
            ],
        )?;
        Ok(())
    }

    /// Load every record of `domain` that belongs to one of `repos`.
    ///
    /// Records come back ordered by creation time, then id. An empty
    /// repository set selects nothing.
    pub fn load_records(&self, domain: Domain, repos: &[RepoId]) -> Result<Vec<EventRecord>> {
        if repos.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; repos.len()].join(", ");
        let sql = format!(
            "SELECT id, repo_id, created_at, closed_at, fields FROM events
             WHERE domain = ? AND repo_id IN ({})
             ORDER BY created_at ASC, id ASC",
            placeholders
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;

        let mut bind: Vec<rusqlite::types::Value> = Vec::with_capacity(repos.len() + 1);
        bind.push(domain.as_str().to_string().into());
        bind.extend(repos.iter().map(|r| rusqlite::types::Value::from(*r)));

        let rows = stmt
            .query_map(params_from_iter(bind), Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total = rows.len();
        let records: Vec<EventRecord> = rows.into_iter().flatten().collect();
        if records.len() < total {
            tracing::warn!(
                domain = %domain,
                skipped = total - records.len(),
                "Skipping stored events with unparseable closed_at"
            );
        }

        Ok(records)
    }

    /// Map a row to a record. `None` when `closed_at` is set but unparseable,
    /// since a missing close time would read as "still open".
    fn row_to_record(row: &Row) -> rusqlite::Result<Option<EventRecord>> {
        let created_str: Option<String> = row.get("created_at")?;
        let closed_str: Option<String> = row.get("closed_at")?;
        let fields_str: String = row.get("fields")?;

        let closed = match closed_str.as_deref() {
            Some(s) => match parse_timestamp(s) {
                Some(ts) => Some(ts),
                None => return Ok(None),
            },
            None => None,
        };

        Ok(Some(EventRecord {
            id: row.get("id")?,
            repo_id: row.get("repo_id")?,
            // Unparseable creation times become absent; aggregations skip such records
            created: created_str.as_deref().and_then(parse_timestamp),
            closed,
            fields: serde_json::from_str::<BTreeMap<String, FieldValue>>(&fields_str)
                .unwrap_or_default(),
        }))
    }

    /// Number of stored records of a domain
    pub fn count_records(&self, domain: Domain) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE domain = ?",
            [domain.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Record and repository counts for every domain with stored events
    pub fn domain_summaries(&self) -> Result<Vec<DomainSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT domain, COUNT(*), COUNT(DISTINCT repo_id) FROM events
             GROUP BY domain ORDER BY domain",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(domain, records, repos)| {
                let domain = domain.parse::<Domain>().ok()?;
                Some(DomainSummary {
                    domain,
                    records,
                    repos,
                })
            })
            .collect())
    }

    /// Distinct repository ids across all domains
    pub fn list_repos(&self) -> Result<Vec<RepoId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT repo_id FROM events ORDER BY repo_id")?;
        let repos = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(repos)
    }

    // ============================================
    // Import history
    // ============================================

    /// Record a finished import
    pub fn insert_import_run(&self, run: &ImportRun) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO imports (domain, source_path, imported, skipped, imported_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                run.domain.as_str(),
                run.source_path,
                run.imported,
                run.skipped,
                run.imported_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent imports first
    pub fn list_import_runs(&self, limit: usize) -> Result<Vec<ImportRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT domain, source_path, imported, skipped, imported_at FROM imports
             ORDER BY imported_at DESC, id DESC LIMIT ?",
        )?;

        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(domain, source_path, imported, skipped, imported_at)| {
                Some(ImportRun {
                    domain: domain.parse().ok()?,
                    source_path,
                    imported,
                    skipped,
                    imported_at: parse_timestamp(&imported_at).unwrap_or_else(Utc::now),
                })
            })
            .collect())
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
