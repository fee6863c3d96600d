//! Service layer for the resumable upload server.
//!
//! - `session_store`: per-client session state (§4.3)
//! - `object_index`: the durable-object/upload-handle index (§4.4)
//! - `storage`: chunk writes, finalize, and orphan sweeping (§4.4, §5)

pub mod object_index;
pub mod session_store;
pub mod storage;

pub use object_index::ObjectIndex;
pub use session_store::{InMemorySessionStore, SessionStore};
pub use storage::{FsStorageService, StorageService};
