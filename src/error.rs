use std::path::PathBuf;

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures surfaced by record stores and the session synchronizer.
///
/// `Validation` means the caller's data was rejected and nothing was written.
/// `Io`, `Corrupt` and `Encode` are storage failures: the operation is abandoned
/// and the backing files need an operator's attention.
/// Unknown records are not errors; lookups return `None`/`false` instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {record:?}: field {key:?} is not JSON-serializable ({reason})")]
    Validation {
        record: String,
        key: String,
        reason: String,
    },
    #[error("invalid record name {name:?}")]
    InvalidName { name: String },
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Unparsable JSON or an undecodable gzip stream.
    #[error("corrupt backing file {path:?}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to encode {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation { .. })
    }

    /// I/O, corrupt-file and encoding failures.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            StoreError::Io { .. } | StoreError::Corrupt { .. } | StoreError::Encode { .. }
        )
    }
}
