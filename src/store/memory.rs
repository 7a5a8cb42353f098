use super::{RecordEntry, RecordMeta, RecordStore, fsio, now, validate_fields};
use crate::error::StoreResult;
use crate::value::Fields;
use indexmap::IndexMap;

/// Keeps records in process memory only; deletion is permanent.
/// Same validation and metadata rules as the on-disk backends.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: IndexMap<String, RecordEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn save(&mut self, name: &str, fields: &Fields) -> StoreResult<()> {
        fsio::validate_name(name)?;
        validate_fields(name, fields)?;
        let entry = RecordEntry::next(self.records.get(name), fields.clone(), now());
        self.records.insert(name.to_string(), entry);
        Ok(())
    }

    fn load(&self, name: &str) -> StoreResult<Option<Fields>> {
        fsio::validate_name(name)?;
        Ok(self.records.get(name).map(|e| e.session_data.clone()))
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        fsio::sort_names(&mut names);
        Ok(names)
    }

    fn delete(&mut self, name: &str) -> StoreResult<bool> {
        fsio::validate_name(name)?;
        Ok(self.records.shift_remove(name).is_some())
    }

    fn exists(&self, name: &str) -> StoreResult<bool> {
        fsio::validate_name(name)?;
        Ok(self.records.contains_key(name))
    }

    fn metadata(&self, name: &str) -> StoreResult<Option<RecordMeta>> {
        fsio::validate_name(name)?;
        Ok(self.records.get(name).map(RecordEntry::meta))
    }
}
