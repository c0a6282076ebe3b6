//! Storefront core types and utilities

pub mod error;
pub mod storage;

pub use error::{CoreError, CoreResult};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StoredValue};
