//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: event snapshot
    r#"
    CREATE TABLE IF NOT EXISTS events (
        domain           TEXT NOT NULL,
        id               TEXT NOT NULL,
        repo_id          INTEGER NOT NULL,
        created_at       DATETIME,
        closed_at        DATETIME,

        -- Domain-specific columns (release_date, cntrb_id, pull_request_id, ...)
        fields           JSON NOT NULL DEFAULT '{}',

        PRIMARY KEY (domain, id)
    );

    CREATE INDEX IF NOT EXISTS idx_events_domain_repo ON events(domain, repo_id);
    "#,
    // Version 2: import history
    r#"
    CREATE TABLE IF NOT EXISTS imports (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        domain           TEXT NOT NULL,
        source_path      TEXT NOT NULL,
        imported         INTEGER NOT NULL,
        skipped          INTEGER NOT NULL,
        imported_at      DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_imports_domain ON imports(domain, imported_at);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
