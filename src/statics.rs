// Central place for file names, document keys and other shared constants.
// Keep these out of the store modules so every backend agrees on the on-disk layout.

// Session contract
pub const DEFAULT_PERSIST_PREFIX: &str = "persist_";

// Whole-file backend
pub const WHOLE_FILE_NAME: &str = "processes.json";
pub const WHOLE_FILE_NAME_GZ: &str = "processes.json.gz";

// Per-record backend
pub const RECORD_EXTENSION: &str = "json";
pub const DELETED_DIR: &str = "deleted";
// No ':' so archive names stay valid on every filesystem.
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6f";

// Audit trail
pub const ACTION_SAVE: &str = "save_process";
pub const ACTION_DELETE: &str = "delete_process";
pub const DETAIL_FIELD_COUNT: &str = "field_count";
pub const DETAIL_ARCHIVED_AS: &str = "archived_as";

// Gzip magic: 1F 8B
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

// Configuration defaults
pub const DEFAULT_DATA_ROOT: &str = "data/processes";
pub const DEFAULT_CONFIG_FILE: &str = "procstore.toml";
pub const DEFAULT_STATUS_KEY: &str = "persist_status";
pub const DEFAULT_COMPLETED_AT_KEY: &str = "persist_completed_at";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const DEFAULT_CLEANUP_DAYS: u32 = 30;

// English CLI strings (EN_ prefix to make future localization easier)
pub const EN_NO_RECORDS: &str = "No processes found.";
pub const EN_NOT_FOUND: &str = "Process not found:";
pub const EN_DRY_RUN_NOTE: &str = "(This was a dry run. Use --execute to actually delete.)";
pub const EN_HISTORY_NEEDS_PER_RECORD: &str =
    "Audit history is only kept by the per-record backend.";
pub const EN_ARCHIVE_NEEDS_PER_RECORD: &str =
    "Archived records only exist in the per-record backend.";
