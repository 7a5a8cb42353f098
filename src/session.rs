//! Session synchronization between the UI's working set and the record store.
//!
//! The working set is the UI's live key/value state. Keys that start with the
//! reserved prefix (default `persist_`) belong to the active record; every other
//! key is transient UI state and never reaches the store.
//!
//! [`Synchronizer`] keeps the two consistent at fixed points:
//! - on every render, [`Synchronizer::persist`] flushes the prefixed keys to the
//!   active record;
//! - on a record switch, [`Synchronizer::select`] flushes the previous record,
//!   then loads the new one into the working set.
//!
//! Right after a switch the working set holds freshly loaded data, and the next
//! per-render flush would only write it straight back (or, if the UI rendered
//! before loading, clobber the new record with the old one's fields). That flush
//! is skipped by passing through [`SyncState::Switched`] rather than through a
//! side-channel flag.

use crate::error::StoreResult;
use crate::statics;
use crate::store::RecordStore;
use crate::value::{FieldValue, Fields};
use indexmap::IndexMap;

/// The UI-owned session state, handed to the synchronizer by reference on every call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingSet {
    entries: IndexMap<String, FieldValue>,
}

/// A prefixed key left out of a flush because its value is not JSON-serializable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedField {
    pub key: String,
    pub reason: String,
}

/// Result of filtering a working set down to persistable fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Persistable {
    pub fields: Fields,
    pub dropped: Vec<DroppedField>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.get(key)
    }

    /// Returns the previous value, if any.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.entries.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, FieldValue> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Keys starting with `prefix`, minus any whose value is not JSON-serializable.
    /// Dropped keys are reported rather than failing the whole set.
    pub fn persistable(&self, prefix: &str) -> Persistable {
        let mut out = Persistable::default();
        for (key, value) in self.entries.iter().filter(|(k, _)| k.starts_with(prefix)) {
            match value.check_json() {
                Ok(()) => {
                    out.fields.insert(key.clone(), value.clone());
                }
                Err(reason) => out.dropped.push(DroppedField {
                    key: key.clone(),
                    reason,
                }),
            }
        }
        out
    }

    /// Drops every `prefix` key, then writes `fields` in (last write wins).
    /// Non-prefixed UI state is left alone.
    fn replace_prefixed(&mut self, prefix: &str, fields: Fields) {
        self.entries.retain(|k, _| !k.starts_with(prefix));
        self.entries.extend(fields);
    }
}

impl FromIterator<(String, FieldValue)> for WorkingSet {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<(String, FieldValue)> for WorkingSet {
    fn extend<I: IntoIterator<Item = (String, FieldValue)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

/// Where the synchronizer stands with respect to the active record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncState {
    /// No record selected; flushes do nothing.
    #[default]
    Idle,
    /// Record selected; each `persist` flushes the working set to it.
    Active(String),
    /// Record just selected and loaded; the next `persist` is skipped, then `Active`.
    Switched(String),
}

impl SyncState {
    pub fn active_record(&self) -> Option<&str> {
        match self {
            SyncState::Idle => None,
            SyncState::Active(name) | SyncState::Switched(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    pub record: String,
    /// Number of fields written.
    pub saved: usize,
    pub dropped: Vec<DroppedField>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    NoActiveRecord,
    /// First render after a switch.
    Skipped { record: String },
    Flushed(FlushReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchReport {
    pub record: String,
    /// Flush of the record that was active before, if it differed.
    pub flushed: Option<FlushReport>,
    /// Fields loaded into the working set, `None` if the record does not exist yet.
    pub loaded: Option<usize>,
}

/// Reconciles a [`WorkingSet`] with a [`RecordStore`] across record switches.
#[derive(Debug)]
pub struct Synchronizer<S = Box<dyn RecordStore>> {
    store: S,
    prefix: String,
    state: SyncState,
}

impl<S: RecordStore> Synchronizer<S> {
    pub fn new(store: S) -> Self {
        Self::with_prefix(store, statics::DEFAULT_PERSIST_PREFIX)
    }

    pub fn with_prefix(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            state: SyncState::Idle,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn active_record(&self) -> Option<&str> {
        self.state.active_record()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Makes `name` the active record.
    ///
    /// Flushes the previously active record first when it differs from `name`,
    /// then replaces the working set's prefixed keys with `name`'s stored fields
    /// (none if the record does not exist yet). On error nothing changes state.
    pub fn select(&mut self, ws: &mut WorkingSet, name: &str) -> StoreResult<SwitchReport> {
        let flushed = match self.state.active_record() {
            Some(previous) if previous != name => {
                let previous = previous.to_string();
                Some(self.flush_to(ws, &previous)?)
            }
            _ => None,
        };

        let loaded = self.store.load(name)?;
        self.state = SyncState::Switched(name.to_string());

        let loaded_count = loaded.as_ref().map(Fields::len);
        ws.replace_prefixed(&self.prefix, loaded.unwrap_or_default());

        tracing::info!(
            record = name,
            previous = flushed.as_ref().map(|f| f.record.as_str()),
            loaded = loaded_count,
            "selected record"
        );
        Ok(SwitchReport {
            record: name.to_string(),
            flushed,
            loaded: loaded_count,
        })
    }

    /// Per-render flush of the working set to the active record.
    pub fn persist(&mut self, ws: &WorkingSet) -> StoreResult<FlushOutcome> {
        match std::mem::take(&mut self.state) {
            SyncState::Idle => Ok(FlushOutcome::NoActiveRecord),
            SyncState::Switched(record) => {
                tracing::debug!(record = %record, "skipping flush right after switch");
                self.state = SyncState::Active(record.clone());
                Ok(FlushOutcome::Skipped { record })
            }
            SyncState::Active(record) => {
                let flushed = self.flush_to(ws, &record);
                self.state = SyncState::Active(record);
                flushed.map(FlushOutcome::Flushed)
            }
        }
    }

    /// Flushes the active record, if any, and clears the active pointer.
    pub fn deselect(&mut self, ws: &WorkingSet) -> StoreResult<Option<FlushReport>> {
        let flushed = match self.state.active_record() {
            Some(record) => {
                let record = record.to_string();
                Some(self.flush_to(ws, &record)?)
            }
            None => None,
        };
        self.state = SyncState::Idle;
        Ok(flushed)
    }

    /// Saves the working set's persistable fields to `record` without touching the state.
    pub fn flush_to(&mut self, ws: &WorkingSet, record: &str) -> StoreResult<FlushReport> {
        let Persistable { fields, dropped } = ws.persistable(&self.prefix);
        for d in &dropped {
            tracing::warn!(record, key = %d.key, reason = %d.reason, "dropping non-serializable field from flush");
        }
        self.store.save(record, &fields)?;
        tracing::debug!(record, saved = fields.len(), "flushed working set");
        Ok(FlushReport {
            record: record.to_string(),
            saved: fields.len(),
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{FlushOutcome, SyncState, Synchronizer, WorkingSet};
    use crate::store::{MemoryStore, RecordStore};
    use crate::value::{FieldValue, Fields};

    fn fields(pairs: &[(&str, FieldValue)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn persistable_keeps_prefixed_serializable_keys_only() {
        let mut ws = WorkingSet::new();
        ws.set("persist_name", "alice");
        ws.set("selected_process", "proc1");
        ws.set("persist_bad", f64::NAN);
        ws.set("persist_ok", 3);

        let p = ws.persistable("persist_");
        let keys: Vec<&str> = p.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["persist_name", "persist_ok"]);
        assert_eq!(p.dropped.len(), 1);
        assert_eq!(p.dropped[0].key, "persist_bad");
    }

    #[test]
    fn replace_prefixed_leaves_ui_state_alone() {
        let mut ws = WorkingSet::new();
        ws.set("persist_a", 1);
        ws.set("nav_step", 2);

        ws.replace_prefixed("persist_", fields(&[("persist_b", FieldValue::from(3))]));
        assert!(!ws.contains_key("persist_a"));
        assert_eq!(ws.get("persist_b"), Some(&FieldValue::from(3)));
        assert_eq!(ws.get("nav_step"), Some(&FieldValue::from(2)));
    }

    #[test]
    fn state_machine_walks_idle_switched_active() {
        let mut sync = Synchronizer::new(MemoryStore::new());
        let mut ws = WorkingSet::new();

        assert_eq!(sync.persist(&ws).unwrap(), FlushOutcome::NoActiveRecord);

        sync.select(&mut ws, "a").unwrap();
        assert_eq!(sync.state(), &SyncState::Switched("a".to_string()));

        assert_eq!(
            sync.persist(&ws).unwrap(),
            FlushOutcome::Skipped {
                record: "a".to_string()
            }
        );
        assert_eq!(sync.state(), &SyncState::Active("a".to_string()));

        ws.set("persist_x", 1);
        match sync.persist(&ws).unwrap() {
            FlushOutcome::Flushed(report) => assert_eq!(report.saved, 1),
            other => panic!("expected flush, got {other:?}"),
        }

        sync.deselect(&ws).unwrap();
        assert_eq!(sync.state(), &SyncState::Idle);
        assert_eq!(sync.active_record(), None);
    }

    #[test]
    fn skipped_render_does_not_write() {
        let mut store = MemoryStore::new();
        store
            .save("b", &fields(&[("persist_v", FieldValue::from("stored"))]))
            .unwrap();
        let mut sync = Synchronizer::new(store);
        let mut ws = WorkingSet::new();

        sync.select(&mut ws, "b").unwrap();
        // A render that ran before the UI caught up still holds a stale value.
        ws.set("persist_v", "stale");
        sync.persist(&ws).unwrap();

        assert_eq!(
            sync.store().load("b").unwrap().unwrap()["persist_v"],
            FieldValue::from("stored")
        );
    }

    #[test]
    fn failed_load_leaves_state_unchanged() {
        let mut sync = Synchronizer::new(MemoryStore::new());
        let mut ws = WorkingSet::new();
        sync.select(&mut ws, "a").unwrap();

        // The flush of `a` succeeds; loading the invalid name fails.
        let err = sync.select(&mut ws, "../escape").unwrap_err();
        assert!(!err.is_storage());
        assert_eq!(sync.active_record(), Some("a"));
    }

    #[test]
    fn custom_prefix_is_honoured() {
        let mut sync = Synchronizer::with_prefix(MemoryStore::new(), "keep.");
        let mut ws = WorkingSet::new();
        sync.select(&mut ws, "r").unwrap();
        sync.persist(&ws).unwrap();

        ws.set("keep.a", 1);
        ws.set("persist_b", 2);
        sync.persist(&ws).unwrap();

        let stored = sync.store().load("r").unwrap().unwrap();
        assert_eq!(stored, fields(&[("keep.a", FieldValue::from(1))]));
    }
}
