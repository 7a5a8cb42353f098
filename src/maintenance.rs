//! Store housekeeping: status queries, cleanup and statistics.
//!
//! Everything here goes through the [`RecordStore`] API (`list`, `load`,
//! `delete`, `list_by`) and never opens backing files itself, so it works the
//! same against any backend.

use crate::config::MaintenanceConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::{RecordStore, Timestamp, parse_iso8601};
use crate::value::{FieldValue, Fields};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What a cleanup pass did (or, for a dry run, would do).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    /// Populated instead of `deleted` on dry runs.
    pub would_delete: Vec<String>,
    pub kept: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: usize,
    /// Records without a string status are counted under `""`.
    pub by_status: BTreeMap<String, usize>,
    /// Sum of each record's compact JSON size.
    pub total_bytes: u64,
}

fn status_of<'a>(fields: &'a Fields, status_key: &str) -> Option<&'a str> {
    fields.get(status_key).and_then(FieldValue::as_str)
}

/// Reads a completion marker; see [`parse_iso8601`] for the accepted shapes.
pub fn parse_timestamp(value: &FieldValue) -> Option<Timestamp> {
    parse_iso8601(value.as_str()?)
}

pub fn list_by_status<S: RecordStore + ?Sized>(
    store: &S,
    status_key: &str,
    status: &str,
) -> StoreResult<Vec<String>> {
    store.list_by(&|_, fields| status_of(fields, status_key) == Some(status))
}

/// Deletes completed records whose completion time is older than `days` before `now`.
/// Records missing either marker, or with an unparsable time, are kept.
pub fn clean_old<S: RecordStore + ?Sized>(
    store: &mut S,
    policy: &MaintenanceConfig,
    days: u32,
    now: Timestamp,
    dry_run: bool,
) -> StoreResult<CleanupReport> {
    let cutoff = now - chrono::Duration::days(i64::from(days));
    let mut report = CleanupReport::default();

    for name in store.list()? {
        let Some(fields) = store.load(&name)? else {
            continue;
        };
        let completed = status_of(&fields, &policy.status_key) == Some(&policy.completed_status);
        let completed_at = fields
            .get(&policy.completed_at_key)
            .and_then(parse_timestamp);

        match completed_at {
            Some(at) if completed && at < cutoff => {
                delete_or_note(store, name, dry_run, &mut report)?;
            }
            _ => report.kept += 1,
        }
    }

    tracing::info!(
        days,
        deleted = report.deleted.len(),
        would_delete = report.would_delete.len(),
        kept = report.kept,
        dry_run,
        "cleaned old records"
    );
    Ok(report)
}

/// Deletes every record whose status equals `status`.
pub fn clean_by_status<S: RecordStore + ?Sized>(
    store: &mut S,
    status_key: &str,
    status: &str,
    dry_run: bool,
) -> StoreResult<CleanupReport> {
    let total = store.list()?.len();
    let matching = list_by_status(store, status_key, status)?;
    let mut report = CleanupReport {
        kept: total - matching.len(),
        ..CleanupReport::default()
    };

    for name in matching {
        delete_or_note(store, name, dry_run, &mut report)?;
    }

    tracing::info!(
        status,
        deleted = report.deleted.len(),
        would_delete = report.would_delete.len(),
        dry_run,
        "cleaned records by status"
    );
    Ok(report)
}

fn delete_or_note<S: RecordStore + ?Sized>(
    store: &mut S,
    name: String,
    dry_run: bool,
    report: &mut CleanupReport,
) -> StoreResult<()> {
    if dry_run {
        report.would_delete.push(name);
    } else if store.delete(&name)? {
        report.deleted.push(name);
    }
    Ok(())
}

pub fn stats<S: RecordStore + ?Sized>(store: &S, status_key: &str) -> StoreResult<StoreStats> {
    let mut stats = StoreStats::default();
    for name in store.list()? {
        let Some(fields) = store.load(&name)? else {
            continue;
        };
        stats.total += 1;
        let status = status_of(&fields, status_key).unwrap_or_default();
        *stats.by_status.entry(status.to_string()).or_default() += 1;
        // No file is involved here; the record name stands in for the path.
        let encoded = serde_json::to_vec(&fields).map_err(|source| StoreError::Encode {
            path: PathBuf::from(&name),
            source,
        })?;
        stats.total_bytes += encoded.len() as u64;
    }
    Ok(stats)
}
