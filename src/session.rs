//! Session state: the per-conversation context and where it is kept

pub mod context;
pub mod sqlite;
pub mod store;
pub mod token;

pub use context::{FactChange, Message, Role, SessionContext};
pub use sqlite::SqliteSessionStore;
pub use store::{FallbackSessionStore, MemorySessionStore, SessionStore, StoreError};
pub use token::{issue_session_id, redact};
