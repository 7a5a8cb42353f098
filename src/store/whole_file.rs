use super::fsio::{self, Compression, FileFormat};
use super::{RecordEntry, RecordMeta, RecordStore, now, validate_fields};
use crate::error::{StoreError, StoreResult};
use crate::statics;
use crate::value::Fields;
use indexmap::IndexMap;
use std::{
    fs,
    path::{Path, PathBuf},
};

type Records = IndexMap<String, RecordEntry>;

/// Every record lives in one JSON document keyed by record name:
/// `{ "<name>": { "session_data": {..}, "created": .., "last_updated": .. } }`.
///
/// Each write is a full read-modify-write of that document, so the file is the
/// only state; nothing is cached between calls. Deletion is permanent.
#[derive(Debug, Clone)]
pub struct WholeFileStore {
    path: PathBuf,
    format: FileFormat,
}

impl WholeFileStore {
    /// Uses `processes.json` (or `processes.json.gz`) under `root`, creating `root` if needed.
    ///
    /// If only the other variant exists on disk, that file is opened and keeps its
    /// own format, so a compression setting change never hides existing records.
    pub fn open(root: impl AsRef<Path>, compression: Compression) -> StoreResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|e| StoreError::io(root, e))?;
        let plain = (root.join(statics::WHOLE_FILE_NAME), FileFormat::Json);
        let gzip = (root.join(statics::WHOLE_FILE_NAME_GZ), FileFormat::GzipJson);
        let (wanted, other) = match compression {
            Compression::None => (plain, gzip),
            Compression::Gzip => (gzip, plain),
        };

        let (path, format) = if !wanted.0.exists() && other.0.exists() {
            tracing::warn!(
                configured = ?compression,
                path = ?other.0,
                "configured store file is absent; opening the existing one instead"
            );
            other
        } else {
            wanted
        };
        Ok(Self { path, format })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> StoreResult<Records> {
        match fsio::read_file(&self.path)? {
            Some(bytes) => fsio::parse_json(&self.path, &bytes),
            None => Ok(Records::new()),
        }
    }

    fn write_all(&self, records: &Records) -> StoreResult<()> {
        let bytes = fsio::encode_json(&self.path, records)?;
        fsio::write_atomic(&self.path, &bytes, self.format)
    }
}

impl RecordStore for WholeFileStore {
    fn save(&mut self, name: &str, fields: &Fields) -> StoreResult<()> {
        fsio::validate_name(name)?;
        validate_fields(name, fields)?;

        let mut records = self.read_all()?;
        let entry = RecordEntry::next(records.get(name), fields.clone(), now());
        records.insert(name.to_string(), entry);
        self.write_all(&records)?;

        tracing::debug!(record = name, fields = fields.len(), path = ?self.path, "saved record");
        Ok(())
    }

    fn load(&self, name: &str) -> StoreResult<Option<Fields>> {
        fsio::validate_name(name)?;
        let mut records = self.read_all()?;
        Ok(records.swap_remove(name).map(|e| e.session_data))
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.read_all()?.into_keys().collect();
        fsio::sort_names(&mut names);
        Ok(names)
    }

    fn delete(&mut self, name: &str) -> StoreResult<bool> {
        fsio::validate_name(name)?;
        let mut records = self.read_all()?;
        if records.shift_remove(name).is_none() {
            return Ok(false);
        }
        self.write_all(&records)?;
        tracing::info!(record = name, "deleted record");
        Ok(true)
    }

    fn exists(&self, name: &str) -> StoreResult<bool> {
        fsio::validate_name(name)?;
        Ok(self.read_all()?.contains_key(name))
    }

    fn metadata(&self, name: &str) -> StoreResult<Option<RecordMeta>> {
        fsio::validate_name(name)?;
        Ok(self.read_all()?.get(name).map(RecordEntry::meta))
    }

    // One read of the backing file instead of one per record.
    fn list_by(&self, predicate: &dyn Fn(&str, &Fields) -> bool) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self
            .read_all()?
            .into_iter()
            .filter(|(name, entry)| predicate(name, &entry.session_data))
            .map(|(name, _)| name)
            .collect();
        fsio::sort_names(&mut names);
        Ok(names)
    }
}
