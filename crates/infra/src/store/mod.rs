//! Owner-scoped storage for items and their movement history.
//!
//! Every call takes the owning user and only ever touches that user's rows,
//! mirroring row-level security on the hosted backend. Another owner's row is
//! indistinguishable from a missing one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockroom_core::{ItemId, MovementId, OwnerId};
use stockroom_inventory::{InventoryItem, StockMovement};

pub mod memory;
pub mod remote;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use remote::{RemoteConfig, RemoteSession, RemoteStore};
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not signed in or session rejected by backend")]
    Unauthenticated,

    #[error("backend returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait::async_trait]
pub trait InventoryStore: Send + Sync {
    /// All items of an owner, in no particular order.
    async fn list_items(&self, owner: OwnerId) -> StoreResult<Vec<InventoryItem>>;

    async fn get_item(&self, owner: OwnerId, id: ItemId) -> StoreResult<Option<InventoryItem>>;

    /// Insert a new row. Fails with `Conflict` if the id already exists or
    /// another item of the owner uses the same SKU (ASCII case-insensitive).
    async fn insert_item(&self, item: &InventoryItem) -> StoreResult<()>;

    /// Replace an existing row whose stored quantity is still
    /// `expected_quantity`.
    ///
    /// Fails with `NotFound` if the row does not exist and with `Conflict` if
    /// the quantity moved or the new SKU is taken.
    async fn update_item(&self, item: &InventoryItem, expected_quantity: i64) -> StoreResult<()>;

    /// Compare-and-set the quantity of an item.
    ///
    /// Fails with `Conflict` if the stored quantity is not `expected`.
    async fn update_quantity(
        &self,
        owner: OwnerId,
        id: ItemId,
        expected: i64,
        quantity: i64,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Delete an item and its movement history. Returns whether a row existed.
    async fn delete_item(&self, owner: OwnerId, id: ItemId) -> StoreResult<bool>;

    async fn insert_movement(&self, movement: &StockMovement) -> StoreResult<()>;

    async fn delete_movement(&self, owner: OwnerId, id: MovementId) -> StoreResult<bool>;

    /// Movements of one item, newest first.
    async fn list_movements(&self, owner: OwnerId, item_id: ItemId) -> StoreResult<Vec<StockMovement>>;
}

#[async_trait::async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn list_items(&self, owner: OwnerId) -> StoreResult<Vec<InventoryItem>> {
        (**self).list_items(owner).await
    }

    async fn get_item(&self, owner: OwnerId, id: ItemId) -> StoreResult<Option<InventoryItem>> {
        (**self).get_item(owner, id).await
    }

    async fn insert_item(&self, item: &InventoryItem) -> StoreResult<()> {
        (**self).insert_item(item).await
    }

    async fn update_item(&self, item: &InventoryItem, expected_quantity: i64) -> StoreResult<()> {
        (**self).update_item(item, expected_quantity).await
    }

    async fn update_quantity(
        &self,
        owner: OwnerId,
        id: ItemId,
        expected: i64,
        quantity: i64,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        (**self)
            .update_quantity(owner, id, expected, quantity, updated_at)
            .await
    }

    async fn delete_item(&self, owner: OwnerId, id: ItemId) -> StoreResult<bool> {
        (**self).delete_item(owner, id).await
    }

    async fn insert_movement(&self, movement: &StockMovement) -> StoreResult<()> {
        (**self).insert_movement(movement).await
    }

    async fn delete_movement(&self, owner: OwnerId, id: MovementId) -> StoreResult<bool> {
        (**self).delete_movement(owner, id).await
    }

    async fn list_movements(&self, owner: OwnerId, item_id: ItemId) -> StoreResult<Vec<StockMovement>> {
        (**self).list_movements(owner, item_id).await
    }
}

pub(crate) fn quantity_moved(current: i64, expected: i64) -> StoreError {
    StoreError::Conflict(format!("quantity is {current} but {expected} was expected"))
}

pub(crate) fn sku_taken(sku: &str) -> StoreError {
    StoreError::Conflict(format!("an item with SKU '{sku}' already exists"))
}

/// Newest first; ties broken by id so the order is stable.
pub(crate) fn sort_movements(movements: &mut [StockMovement]) {
    movements.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}
