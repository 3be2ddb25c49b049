//! Infrastructure for stockroom: storage adapters and the application service.
//!
//! - `store`: the owner-scoped `InventoryStore` trait with in-memory, SQLite
//!   and hosted REST implementations
//! - `service`: `InventoryService`, the operations exposed over HTTP

pub mod service;
pub mod store;


pub use service::{
    AdjustOutcome, ChangeKind, ImportSummary, InventoryService, ItemChange, ServiceError,
    ServiceResult,
};
pub use store::{
    InMemoryStore, InventoryStore, RemoteConfig, RemoteSession, RemoteStore, SqliteStore,
    StoreError, StoreResult,
};
