//! playcoach-storage: durable gameplay-log records, object storage, and the
//! live history view built on the record store's change feed.

pub mod conformance;
mod error;
mod live;
mod memory;
mod objects;
mod record;
mod traits;

pub use error::StorageError;
pub use live::{HistoryDelta, HistorySnapshot, HistoryStream, LiveHistory, Unsubscribe};
pub use memory::MemoryResultStore;
pub use objects::{FsObjectStore, MemoryObjectStore};
pub use record::{record_path, GameplayLogRecord, NewGameplayLog};
pub use traits::{ChangeEvent, ChangeFeed, ObjectStore, ResultStore};
