//! Local persistence for the Life-Log companion bridge.
//!
//! This crate provides SQLite-based storage for everything the bridge must
//! remember across restarts: user settings, the pending upload queue, and
//! the key of the last record delivered.
//!
//! # Features
//!
//! - Named scalar settings, written synchronously
//! - Atomic multi-setting writes
//! - Durable FIFO queue of `(key, line)` records
//!
//! # Example
//!
//! ```no_run
//! use lifelog_store::{PersistentQueue, Store};
//! use lifelog_types::QueueRecord;
//!
//! let store = Store::open_default()?;
//! let mut queue = PersistentQueue::load(&store)?;
//! queue.append(&store, QueueRecord::new("1476000000", "2016-10-09T08:00:00Z,3,Coffee"))?;
//! # Ok::<(), lifelog_store::Error>(())
//! ```

mod error;
mod queue;
mod schema;
mod store;

pub use error::{Error, Result};
pub use queue::PersistentQueue;
pub use store::Store;

/// Names of the persisted settings.
pub mod setting_keys {
    /// Serialized pending queue.
    pub const QUEUE: &str = "queue";
    /// Key of the last record acknowledged by the endpoint.
    pub const LAST_SENT_KEY: &str = "last-sent-key";
    pub const EVENT_LIST: &str = "event-list";
    pub const BEGIN_PREFIX: &str = "begin-prefix";
    pub const END_PREFIX: &str = "end-prefix";
    pub const EXTRA_FIELDS: &str = "extra-fields";
    pub const URL: &str = "url";
    pub const DATA_FIELD: &str = "data-field";
    pub const SIGN_ALGORITHM: &str = "sign-algorithm";
    pub const SIGN_FIELD_NAME: &str = "sign-field-name";
    pub const SIGN_FIELD_FORMAT: &str = "sign-field-format";
    pub const SIGN_KEY: &str = "sign-key";
    pub const SIGN_KEY_FORMAT: &str = "sign-key-format";
}

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/lifelog/bridge.db`
/// - macOS: `~/Library/Application Support/lifelog/bridge.db`
/// - Windows: `C:\Users\<user>\AppData\Local\lifelog\bridge.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("lifelog")
        .join("bridge.db")
}
