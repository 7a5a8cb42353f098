//! Durable record storage.
//!
//! [`RecordStore`] is the single interface every backend implements. Backends are
//! picked by configuration through [`open_store`]:
//! - [`WholeFileStore`]: every record in one `processes.json` (optionally gzip).
//! - [`PerRecordStore`]: one file per record with an audit trail and soft delete.
//! - [`MemoryStore`]: no disk at all.

mod fsio;
mod memory;
mod per_record;
mod whole_file;

pub use fsio::{Compression, FileFormat};
pub use memory::MemoryStore;
pub use per_record::{ArchivedRecord, PerRecordStore};
pub use whole_file::WholeFileStore;

use crate::config::{Backend, Config};
use crate::error::{StoreError, StoreResult};
use crate::value::{Fields, first_invalid_field};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Timestamps keep the offset they were written with, so re-saving a document
/// never rewrites history in another timezone.
pub type Timestamp = DateTime<FixedOffset>;

pub fn now() -> Timestamp {
    Local::now().fixed_offset()
}

/// Parses RFC 3339, offset-less ISO-8601 (`2025-01-15T10:30:00[.ffffff]`, also with a
/// space separator) read as local time, or a bare date at local midnight.
pub fn parse_iso8601(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts);
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.fixed_offset())
}

/// `deserialize_with` for stored timestamps: accepts whatever [`parse_iso8601`] does.
/// Writing always goes through chrono's RFC 3339 `Serialize`.
pub(crate) mod iso8601 {
    use super::{Timestamp, parse_iso8601};
    use serde::{Deserialize, Deserializer, de};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_iso8601(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid ISO-8601 timestamp {text:?}")))
    }
}

/// Creation and last-save times of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    #[serde(deserialize_with = "iso8601::deserialize")]
    pub created: Timestamp,
    #[serde(deserialize_with = "iso8601::deserialize")]
    pub last_updated: Timestamp,
}

/// One record as held by the whole-file and memory backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub session_data: Fields,
    #[serde(deserialize_with = "iso8601::deserialize")]
    pub created: Timestamp,
    #[serde(deserialize_with = "iso8601::deserialize")]
    pub last_updated: Timestamp,
}

impl RecordEntry {
    /// Builds the entry that replaces `previous`: fields wholesale, `created` kept.
    pub fn next(previous: Option<&RecordEntry>, fields: Fields, at: Timestamp) -> Self {
        Self {
            session_data: fields,
            created: previous.map_or(at, |p| p.created),
            last_updated: at,
        }
    }

    pub fn meta(&self) -> RecordMeta {
        RecordMeta {
            created: self.created,
            last_updated: self.last_updated,
        }
    }
}

/// Create/read/update/delete/list over named records of JSON-shaped fields.
///
/// Reads take `&self`; writes take `&mut self`. Unknown names are never errors:
/// `load`/`metadata` return `None` and `delete` returns `false`.
pub trait RecordStore {
    /// Replaces the record's fields wholesale. Rejects the whole write with
    /// [`StoreError::Validation`] if any field is not JSON-serializable.
    fn save(&mut self, name: &str, fields: &Fields) -> StoreResult<()>;

    fn load(&self, name: &str) -> StoreResult<Option<Fields>>;

    /// All record names, reverse-lexicographic.
    fn list(&self) -> StoreResult<Vec<String>>;

    /// Returns whether a record was removed.
    fn delete(&mut self, name: &str) -> StoreResult<bool>;

    fn exists(&self, name: &str) -> StoreResult<bool>;

    fn metadata(&self, name: &str) -> StoreResult<Option<RecordMeta>>;

    /// Names whose fields satisfy `predicate`, in `list` order.
    fn list_by(&self, predicate: &dyn Fn(&str, &Fields) -> bool) -> StoreResult<Vec<String>> {
        let mut matching = Vec::new();
        for name in self.list()? {
            if let Some(fields) = self.load(&name)? {
                if predicate(&name, &fields) {
                    matching.push(name);
                }
            }
        }
        Ok(matching)
    }
}

impl<S: RecordStore + ?Sized> RecordStore for &mut S {
    fn save(&mut self, name: &str, fields: &Fields) -> StoreResult<()> {
        (**self).save(name, fields)
    }
    fn load(&self, name: &str) -> StoreResult<Option<Fields>> {
        (**self).load(name)
    }
    fn list(&self) -> StoreResult<Vec<String>> {
        (**self).list()
    }
    fn delete(&mut self, name: &str) -> StoreResult<bool> {
        (**self).delete(name)
    }
    fn exists(&self, name: &str) -> StoreResult<bool> {
        (**self).exists(name)
    }
    fn metadata(&self, name: &str) -> StoreResult<Option<RecordMeta>> {
        (**self).metadata(name)
    }
    fn list_by(&self, predicate: &dyn Fn(&str, &Fields) -> bool) -> StoreResult<Vec<String>> {
        (**self).list_by(predicate)
    }
}

impl<S: RecordStore + ?Sized> RecordStore for Box<S> {
    fn save(&mut self, name: &str, fields: &Fields) -> StoreResult<()> {
        (**self).save(name, fields)
    }
    fn load(&self, name: &str) -> StoreResult<Option<Fields>> {
        (**self).load(name)
    }
    fn list(&self) -> StoreResult<Vec<String>> {
        (**self).list()
    }
    fn delete(&mut self, name: &str) -> StoreResult<bool> {
        (**self).delete(name)
    }
    fn exists(&self, name: &str) -> StoreResult<bool> {
        (**self).exists(name)
    }
    fn metadata(&self, name: &str) -> StoreResult<Option<RecordMeta>> {
        (**self).metadata(name)
    }
    fn list_by(&self, predicate: &dyn Fn(&str, &Fields) -> bool) -> StoreResult<Vec<String>> {
        (**self).list_by(predicate)
    }
}

/// Rejects `fields` for `name` if any value falls outside strict JSON.
pub(crate) fn validate_fields(name: &str, fields: &Fields) -> StoreResult<()> {
    if let Some((key, reason)) = first_invalid_field(fields) {
        return Err(StoreError::Validation {
            record: name.to_string(),
            key: key.to_string(),
            reason,
        });
    }
    Ok(())
}

/// Opens the backend named by `config.backend` under `config.root`.
pub fn open_store(config: &Config) -> StoreResult<Box<dyn RecordStore>> {
    match config.backend {
        Backend::WholeFile => Ok(Box::new(WholeFileStore::open(
            &config.root,
            config.compression,
        )?)),
        Backend::PerRecord => {
            if config.compression != Compression::None {
                tracing::warn!("compression is ignored by the per-record backend");
            }
            Ok(Box::new(PerRecordStore::open(&config.root)?))
        }
    }
}
