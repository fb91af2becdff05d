pub mod cache;
pub mod database;
pub mod error_handling;
pub mod in_memory_store;
pub mod permission;

pub use cache::{CacheStats, MemoCache};
pub use database::SqliteStore;
pub use in_memory_store::{InMemoryStore, StoreOperation, StoreState};
pub use permission::RolePermissionOracle;
