//! File helpers shared by the on-disk backends: format detection, gzip,
//! atomic replacement and record-name checks.

use crate::error::{StoreError, StoreResult};
use crate::statics;
use flate2::{Compression as GzLevel, GzBuilder, read::GzDecoder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    fs,
    io::{self, Read, Write},
    path::Path,
};

/// On-disk encoding of a backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    GzipJson,
}

/// Compression applied when writing a whole-file store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

pub(crate) fn detect_format(path: &Path, bytes: &[u8]) -> FileFormat {
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        return FileFormat::GzipJson;
    }
    if bytes.len() >= 2 && bytes[..2] == statics::GZIP_MAGIC {
        return FileFormat::GzipJson;
    }
    FileFormat::Json
}

/// Reads a backing file, transparently inflating gzip.
/// A missing file is `Ok(None)`: an empty store, not an error.
pub(crate) fn read_file(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    match detect_format(path, &bytes) {
        FileFormat::Json => Ok(Some(bytes)),
        FileFormat::GzipJson => {
            let mut decoder = GzDecoder::new(&bytes[..]);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| StoreError::Corrupt {
                    path: path.to_path_buf(),
                    source: Box::new(e),
                })?;
            Ok(Some(out))
        }
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        source: Box::new(e),
    })
}

pub(crate) fn encode_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Replaces `path` with `bytes` in one rename, so readers see either the old
/// or the new file and never a torn write.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8], format: FileFormat) -> StoreResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let payload = match format {
        FileFormat::Json => bytes.to_vec(),
        FileFormat::GzipJson => {
            let mut encoder = GzBuilder::new()
                .mtime(0)
                .write(Vec::new(), GzLevel::default());
            encoder.write_all(bytes).map_err(|e| StoreError::io(path, e))?;
            encoder.finish().map_err(|e| StoreError::io(path, e))?
        }
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(&payload).map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

/// Record names double as file stems, so they must be usable as one path component.
pub(crate) fn validate_name(name: &str) -> StoreResult<()> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Reverse-lexicographic, so date-prefixed names list newest first.
pub(crate) fn sort_names(names: &mut [String]) {
    names.sort_unstable_by(|a, b| b.cmp(a));
}

#[cfg(test)]
mod tests {
    use super::{FileFormat, detect_format, read_file, sort_names, validate_name, write_atomic};
    use crate::error::StoreError;
    use std::path::Path;

    #[test]
    fn detect_format_uses_extension_and_magic() {
        let gz_magic = [0x1F_u8, 0x8B_u8, 0x08_u8, 0x00_u8];
        let plain = b"{}\n";

        assert_eq!(
            detect_format(Path::new("processes.json.gz"), plain),
            FileFormat::GzipJson
        );
        assert_eq!(
            detect_format(Path::new("processes.json"), &gz_magic),
            FileFormat::GzipJson
        );
        assert_eq!(
            detect_format(Path::new("processes.json"), plain),
            FileFormat::Json
        );
    }

    #[test]
    fn gzip_write_reads_back_inflated() {
        let dir = tempfile::tempdir().unwrap();
        // Plain name on purpose: detection must fall back to the magic bytes.
        let path = dir.path().join("processes.json");

        write_atomic(&path, b"{\"a\": 1}", FileFormat::GzipJson).unwrap();
        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &[0x1F, 0x8B]);

        let inflated = read_file(&path).unwrap().unwrap();
        assert_eq!(inflated, b"{\"a\": 1}");
    }

    #[test]
    fn truncated_gzip_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processes.json.gz");
        let body = br#"{"proc1": {"session_data": {"persist_status": "running"}}}"#;
        write_atomic(&path, body, FileFormat::GzipJson).unwrap();

        let raw = std::fs::read(&path).unwrap();
        std::fs::write(&path, &raw[..raw.len() / 2]).unwrap();

        let err = read_file(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "got {err:?}");
        assert!(err.is_storage());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_file(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn write_atomic_creates_parent_dirs_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("r.json");

        write_atomic(&path, b"one", FileFormat::Json).unwrap();
        write_atomic(&path, b"two", FileFormat::Json).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");

        // No temp files left behind.
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn names_must_be_single_path_components() {
        assert!(validate_name("2025-01-15_weekly").is_ok());
        assert!(validate_name("週次プロセス").is_ok());
        for bad in ["", ".hidden", "..", "a/b", "a\\b", "nul\0"] {
            assert!(validate_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn sort_names_is_reverse_lexicographic() {
        let mut names = vec![
            "2025-01-01".to_string(),
            "2025-03-01".to_string(),
            "2025-02-01".to_string(),
        ];
        sort_names(&mut names);
        assert_eq!(names, vec!["2025-03-01", "2025-02-01", "2025-01-01"]);
    }
}
