//! Core library for procstore.
//! Durable "process" records of arbitrary JSON-shaped fields, plus the session
//! synchronizer that keeps a UI's working set and the store consistent across
//! record switches.

pub mod audit;
pub mod config;
mod error;
pub mod maintenance;
pub mod session;
pub mod statics;
pub mod store;
mod value;

pub use config::{Backend, Config};
pub use error::{StoreError, StoreResult};
pub use session::{FlushOutcome, Synchronizer, WorkingSet};
pub use store::{MemoryStore, PerRecordStore, RecordMeta, RecordStore, WholeFileStore, open_store};
pub use value::{FieldNumber, FieldValue, Fields};
