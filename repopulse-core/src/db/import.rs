//! JSON-lines import into the event snapshot
//!
//! Each non-empty line is one JSON object describing one event:
//!
//! ```json
//! {"id": 17, "repo_id": 3, "created": "2024-01-05T10:00:00Z", "closed": null, "cntrb_id": "a1"}
//! ```
//!
//! - `id` and `repo_id` are required; `id` may be a number or a string.
//! - `created`/`created_at` and `closed`/`closed_at` are RFC 3339 timestamps.
//! - Every other key is kept as a domain field.
//!
//! ## Error Handling
//!
//! - **Malformed JSON lines**: logged as warning, line skipped, import continues.
//! - **Missing `id` or `repo_id`**: logged as warning, line skipped.
//! - **Unparseable `created`**: the record is stored without a creation time
//!   and skipped later by the aggregations.
//! - **Unparseable `closed`**: logged as warning, line skipped. Storing it
//!   without a close time would count the item as open forever.

use super::repo::{Database, ImportRun};
use crate::error::Result;
use crate::types::{Domain, EventRecord, FieldValue, RepoId};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const CREATED_KEYS: &[&str] = &["created", "created_at"];
const CLOSED_KEYS: &[&str] = &["closed", "closed_at"];

/// Outcome of one import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

impl Database {
    /// Import a JSON-lines file of `domain` events, replacing records with the same id.
    pub fn import_jsonl(&self, domain: Domain, path: &Path) -> Result<ImportSummary> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut summary = ImportSummary::default();
        let mut records = Vec::new();

        for (index, line_result) in reader.lines().enumerate() {
            let line_number = index + 1;
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            match parse_line(&line) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    tracing::warn!(
                        path = %path.display(),
                        line_number,
                        reason = %reason,
                        "Skipping event line"
                    );
                    summary
                        .warnings
                        .push(format!("Line {}: {}", line_number, reason));
                    summary.skipped += 1;
                }
            }
        }

        summary.imported = self.upsert_records(domain, &records)?;
        self.insert_import_run(&ImportRun {
            domain,
            source_path: path.display().to_string(),
            imported: summary.imported as i64,
            skipped: summary.skipped as i64,
            imported_at: Utc::now(),
        })?;

        tracing::info!(
            domain = %domain,
            path = %path.display(),
            imported = summary.imported,
            skipped = summary.skipped,
            "Import complete"
        );

        Ok(summary)
    }
}

/// Parse one JSON line into an event record.
pub fn parse_line(line: &str) -> std::result::Result<EventRecord, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| format!("JSON parse error: {}", e))?;
    let Value::Object(object) = value else {
        return Err("expected a JSON object".to_string());
    };
    record_from_object(object)
}

fn record_from_object(mut object: Map<String, Value>) -> std::result::Result<EventRecord, String> {
    let id = match object.remove("id") {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err("missing id".to_string()),
    };
    let repo_id: RepoId = object
        .remove("repo_id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| "missing repo_id".to_string())?;

    let created = take_timestamp(&mut object, CREATED_KEYS).unwrap_or(None);
    let closed = take_timestamp(&mut object, CLOSED_KEYS)?;

    let fields: BTreeMap<String, FieldValue> = object
        .into_iter()
        .map(|(key, value)| (key, json_to_field(value)))
        .collect();

    Ok(EventRecord {
        id,
        repo_id,
        created,
        closed,
        fields,
    })
}

/// Remove the first timestamp found under `keys`.
///
/// Absent and null values give `Ok(None)`; a present value that does not
/// parse is an error unless another key holds a valid timestamp.
fn take_timestamp(
    object: &mut Map<String, Value>,
    keys: &[&str],
) -> std::result::Result<Option<DateTime<Utc>>, String> {
    let mut found = None;
    let mut invalid = None;
    for key in keys {
        match object.remove(*key) {
            None | Some(Value::Null) => {}
            Some(value) => {
                let rendered = value.to_string();
                match json_to_field(value).as_timestamp() {
                    Some(ts) => found = found.or(Some(ts)),
                    None => {
                        invalid = invalid.or(Some(format!("unparseable {}: {}", key, rendered)))
                    }
                }
            }
        }
    }
    match (found, invalid) {
        (Some(ts), _) => Ok(Some(ts)),
        (None, Some(reason)) => Err(reason),
        (None, None) => Ok(None),
    }
}

fn json_to_field(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::String(s) => FieldValue::Text(s),
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Integer(i),
            None => FieldValue::Text(n.to_string()),
        },
        other => FieldValue::Text(other.to_string()),
    }
}
