use super::fsio::{self, FileFormat};
use super::{RecordMeta, RecordStore, Timestamp, now, validate_fields};
use crate::audit::{AuditEntry, AuditTrail};
use crate::error::{StoreError, StoreResult};
use crate::statics;
use crate::value::Fields;
use chrono::{Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// On-disk shape of `<name>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RecordDocument {
    session_data: Fields,
    #[serde(deserialize_with = "super::iso8601::deserialize")]
    created: Timestamp,
    #[serde(deserialize_with = "super::iso8601::deserialize")]
    last_updated: Timestamp,
    #[serde(default)]
    audit_trail: AuditTrail,
}

/// A soft-deleted record sitting in `deleted/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedRecord {
    pub name: String,
    pub deleted_at: Timestamp,
    pub path: PathBuf,
}

/// One `<name>.json` per record under `root`, each carrying its own audit trail.
///
/// Deleting a record moves it to `deleted/<name>_<timestamp>.json` after
/// appending a delete entry to its trail; nothing is ever destroyed except by
/// [`PerRecordStore::purge_archived`].
#[derive(Debug, Clone)]
pub struct PerRecordStore {
    root: PathBuf,
}

impl PerRecordStore {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|e| StoreError::io(root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{name}.{}", statics::RECORD_EXTENSION))
    }

    fn deleted_dir(&self) -> PathBuf {
        self.root.join(statics::DELETED_DIR)
    }

    fn read_document(&self, name: &str) -> StoreResult<Option<RecordDocument>> {
        fsio::validate_name(name)?;
        let path = self.record_path(name);
        match fsio::read_file(&path)? {
            Some(bytes) => fsio::parse_json(&path, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn write_document(path: &Path, doc: &RecordDocument) -> StoreResult<()> {
        let bytes = fsio::encode_json(path, doc)?;
        fsio::write_atomic(path, &bytes, FileFormat::Json)
    }

    /// Full audit trail of a live record, oldest first.
    pub fn audit_trail(&self, name: &str) -> StoreResult<Option<AuditTrail>> {
        Ok(self.read_document(name)?.map(|doc| doc.audit_trail))
    }

    /// Soft-deleted records, newest deletion first. Files whose names do not
    /// follow the archive pattern are skipped.
    pub fn archived(&self) -> StoreResult<Vec<ArchivedRecord>> {
        let dir = self.deleted_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut archived = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(statics::RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match parse_archive_stem(stem) {
                Some((name, deleted_at)) => archived.push(ArchivedRecord {
                    name: name.to_string(),
                    deleted_at,
                    path,
                }),
                None => tracing::warn!(path = ?path, "skipping unrecognised archive file"),
            }
        }
        archived.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        Ok(archived)
    }

    /// Permanently removes archives deleted before `cutoff`. Returns what was removed.
    pub fn purge_archived(&mut self, cutoff: Timestamp) -> StoreResult<Vec<ArchivedRecord>> {
        let mut purged = Vec::new();
        for archive in self.archived()? {
            if archive.deleted_at >= cutoff {
                continue;
            }
            fs::remove_file(&archive.path).map_err(|e| StoreError::io(&archive.path, e))?;
            tracing::info!(record = %archive.name, path = ?archive.path, "purged archive");
            purged.push(archive);
        }
        Ok(purged)
    }
}

impl RecordStore for PerRecordStore {
    fn save(&mut self, name: &str, fields: &Fields) -> StoreResult<()> {
        fsio::validate_name(name)?;
        validate_fields(name, fields)?;

        let at = now();
        let mut doc = match self.read_document(name)? {
            Some(mut doc) => {
                doc.session_data = fields.clone();
                doc.last_updated = at;
                doc
            }
            None => RecordDocument {
                session_data: fields.clone(),
                created: at,
                last_updated: at,
                audit_trail: AuditTrail::new(),
            },
        };
        doc.audit_trail.append(AuditEntry::saved(at, fields.len()));

        let path = self.record_path(name);
        Self::write_document(&path, &doc)?;
        tracing::debug!(
            record = name,
            fields = fields.len(),
            trail = doc.audit_trail.len(),
            "saved record"
        );
        Ok(())
    }

    fn load(&self, name: &str) -> StoreResult<Option<Fields>> {
        Ok(self.read_document(name)?.map(|doc| doc.session_data))
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(statics::RECORD_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if fsio::validate_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        fsio::sort_names(&mut names);
        Ok(names)
    }

    fn delete(&mut self, name: &str) -> StoreResult<bool> {
        let Some(mut doc) = self.read_document(name)? else {
            return Ok(false);
        };

        let at = now();
        let archive_name = format!(
            "{name}_{}.{}",
            at.format(statics::ARCHIVE_TIMESTAMP_FORMAT),
            statics::RECORD_EXTENSION
        );
        doc.audit_trail.append(AuditEntry::deleted(at, &archive_name));

        let archive_path = self.deleted_dir().join(&archive_name);
        Self::write_document(&archive_path, &doc)?;

        let live = self.record_path(name);
        fs::remove_file(&live).map_err(|e| StoreError::io(&live, e))?;

        tracing::info!(record = name, archive = ?archive_path, "archived record");
        Ok(true)
    }

    fn exists(&self, name: &str) -> StoreResult<bool> {
        fsio::validate_name(name)?;
        Ok(self.record_path(name).is_file())
    }

    fn metadata(&self, name: &str) -> StoreResult<Option<RecordMeta>> {
        Ok(self.read_document(name)?.map(|doc| RecordMeta {
            created: doc.created,
            last_updated: doc.last_updated,
        }))
    }
}

/// Splits `<name>_<timestamp>` at the last underscore. Names may contain underscores;
/// the timestamp format never does.
fn parse_archive_stem(stem: &str) -> Option<(&str, Timestamp)> {
    let (name, stamp) = stem.rsplit_once('_')?;
    if name.is_empty() {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(stamp, statics::ARCHIVE_TIMESTAMP_FORMAT).ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some((name, local.fixed_offset()))
}

#[cfg(test)]
mod tests {
    use super::{PerRecordStore, parse_archive_stem};
    use crate::statics;
    use crate::store::RecordStore;
    use crate::value::{FieldValue, Fields};

    fn fields(pairs: &[(&str, i64)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::from(*v)))
            .collect()
    }

    #[test]
    fn parse_archive_stem_handles_underscored_names() {
        let (name, at) = parse_archive_stem("weekly_report_20250115T103000.123456").unwrap();
        assert_eq!(name, "weekly_report");
        assert_eq!(
            at.format(statics::ARCHIVE_TIMESTAMP_FORMAT).to_string(),
            "20250115T103000.123456"
        );

        assert!(parse_archive_stem("no-timestamp").is_none());
        assert!(parse_archive_stem("_20250115T103000.123456").is_none());
        assert!(parse_archive_stem("x_garbage").is_none());
    }

    #[test]
    fn list_ignores_archive_dir_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PerRecordStore::open(dir.path()).unwrap();
        store.save("a", &fields(&[("persist_n", 1)])).unwrap();
        store.save("b", &fields(&[("persist_n", 2)])).unwrap();
        store.delete("b").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();

        assert_eq!(store.list().unwrap(), vec!["a"]);
    }

    #[test]
    fn save_preserves_existing_trail_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PerRecordStore::open(dir.path()).unwrap();
        store.save("r", &fields(&[("persist_n", 1)])).unwrap();
        store
            .save("r", &fields(&[("persist_n", 2), ("persist_m", 3)]))
            .unwrap();

        let trail = store.audit_trail("r").unwrap().unwrap();
        let counts: Vec<i64> = trail
            .iter()
            .map(|e| e.details[statics::DETAIL_FIELD_COUNT].as_i64().unwrap())
            .collect();
        assert_eq!(counts, vec![1, 2]);
    }

    #[test]
    fn purge_removes_only_older_archives() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PerRecordStore::open(dir.path()).unwrap();
        store.save("old", &fields(&[("persist_n", 1)])).unwrap();
        store.delete("old").unwrap();

        // Nothing was deleted before the epoch.
        let epoch = chrono::DateTime::parse_from_rfc3339("1970-01-01T00:00:00+00:00").unwrap();
        assert!(store.purge_archived(epoch).unwrap().is_empty());
        assert_eq!(store.archived().unwrap().len(), 1);

        let future = crate::store::now() + chrono::Duration::days(1);
        let purged = store.purge_archived(future).unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].name, "old");
        assert!(store.archived().unwrap().is_empty());
    }
}
