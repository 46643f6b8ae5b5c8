//! 会话持久化：append-only 记录、存储后端（内存 / SQLite）、SessionStore

pub mod backend;
pub mod memory;
pub mod record;
pub mod sqlite;
pub mod store;

pub use backend::{StoreBackend, StoreError};
pub use memory::{InMemoryBackend, DEFAULT_MAX_ITEM_BYTES};
pub use record::{partition_key, validate_session_id, RecordKind, SessionRecord, SortKeyClock};
pub use sqlite::SqliteBackend;
pub use store::{SessionStore, DEFAULT_TTL_SECS};
