//! Persistent storage modules for conversation messages.

pub mod in_memory_store;
pub mod message_store;
pub mod sqlite_store;
pub mod sqlite_vec_loader;

pub use in_memory_store::InMemoryMessageStore;
pub use message_store::{MessageStore, StoreFuture};
pub use sqlite_store::SqliteMessageStore;
pub use sqlite_vec_loader::init_sqlite_vec_extension;
