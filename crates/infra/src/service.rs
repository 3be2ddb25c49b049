//! Application service: the operations the inventory screens perform.
//!
//! `InventoryService` composes an [`InventoryStore`] with the pure domain rules
//! from `stockroom-inventory`:
//!
//! ```text
//! request
//!   -> load current rows (owner-scoped)
//!   -> decide with domain logic (validate, plan adjustment, parse CSV)
//!   -> write through the store
//!   -> publish an ItemChange to subscribers
//! ```
//!
//! The hosted backend has no cross-row transactions, so a stock adjustment is
//! two writes: the movement first, then a compare-and-set on the item's
//! quantity. When the second write fails the movement is deleted again; if
//! that delete fails too the orphan is logged and the original error returned.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use stockroom_core::{DomainError, ItemId, OwnerId};
use stockroom_inventory::{
    AdjustStock, CsvError, InventoryItem, ItemPatch, ItemQuery, MovementDirection, NewItem, Page,
    RowError, StockMovement, export_items, import_items, low_stock,
};

use crate::store::{InventoryStore, StoreError};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Reason recorded on the movement created when an edit changes the quantity.
pub const EDIT_REASON: &str = "edited";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("invalid csv: {0}")]
    Csv(#[from] CsvError),

    /// Storage failure that is not a business outcome (network, decode, IO).
    #[error("storage failure: {0}")]
    Store(StoreError),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) => ServiceError::InvariantViolation(msg),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::NotFound => ServiceError::NotFound,
            DomainError::Unauthorized => ServiceError::Unauthenticated,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Unauthenticated => ServiceError::Unauthenticated,
            other => ServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Adjusted,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Adjusted => "adjusted",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// Notification published after every successful write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemChange {
    #[serde(skip)]
    pub owner_id: OwnerId,
    pub kind: ChangeKind,
    pub item_id: ItemId,
    /// Item state after the change; `None` for deletions.
    pub item: Option<InventoryItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustOutcome {
    pub item: InventoryItem,
    pub movement: StockMovement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub errors: Vec<RowError>,
}

#[derive(Clone)]
pub struct InventoryService<S> {
    store: S,
    changes: broadcast::Sender<ItemChange>,
}

impl<S> std::fmt::Debug for InventoryService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryService")
            .field("subscribers", &self.changes.receiver_count())
            .finish_non_exhaustive()
    }
}

impl<S> InventoryService<S> {
    pub fn new(store: S) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { store, changes }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Same change channel over another store, e.g. one acting for a single caller.
    pub fn with_store<T>(&self, store: T) -> InventoryService<T> {
        InventoryService {
            store,
            changes: self.changes.clone(),
        }
    }

    /// Subscribe to changes of every owner; consumers filter by `owner_id`.
    pub fn subscribe(&self) -> broadcast::Receiver<ItemChange> {
        self.changes.subscribe()
    }

    fn publish(&self, owner_id: OwnerId, kind: ChangeKind, item_id: ItemId, item: Option<InventoryItem>) {
        // No subscribers is not an error.
        let _ = self.changes.send(ItemChange {
            owner_id,
            kind,
            item_id,
            item,
        });
    }
}

fn same_sku(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn sku_taken(items: &[InventoryItem], sku: &str, except: Option<ItemId>) -> bool {
    items.iter().any(|other| {
        Some(other.id) != except && other.sku.as_deref().is_some_and(|s| same_sku(s, sku))
    })
}

fn duplicate_sku(sku: &str) -> ServiceError {
    ServiceError::Conflict(format!("an item with SKU '{sku}' already exists"))
}

impl<S> InventoryService<S>
where
    S: InventoryStore,
{
    async fn load(&self, owner: OwnerId, id: ItemId) -> ServiceResult<InventoryItem> {
        self.store
            .get_item(owner, id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    #[instrument(skip(self, input), fields(owner_id = %owner), err)]
    pub async fn create_item(&self, owner: OwnerId, input: NewItem) -> ServiceResult<InventoryItem> {
        let item = InventoryItem::create(owner, input, Utc::now())?;
        if let Some(sku) = item.sku.as_deref() {
            let existing = self.store.list_items(owner).await?;
            if sku_taken(&existing, sku, None) {
                return Err(duplicate_sku(sku));
            }
        }

        self.store.insert_item(&item).await?;
        info!(item_id = %item.id, "item created");
        self.publish(owner, ChangeKind::Created, item.id, Some(item.clone()));
        Ok(item)
    }

    #[instrument(skip(self), fields(owner_id = %owner), err)]
    pub async fn get_item(&self, owner: OwnerId, id: ItemId) -> ServiceResult<InventoryItem> {
        self.load(owner, id).await
    }

    /// Apply a partial edit. A changed quantity is recorded as a `set` movement.
    ///
    /// Fails with `Conflict` if the stock moved since the item was read.
    #[instrument(skip(self, patch), fields(owner_id = %owner), err)]
    pub async fn update_item(
        &self,
        owner: OwnerId,
        id: ItemId,
        patch: ItemPatch,
    ) -> ServiceResult<InventoryItem> {
        let before = self.load(owner, id).await?;
        if patch.is_empty() {
            return Ok(before);
        }

        let now = Utc::now();
        let mut item = before.clone();
        item.apply_patch(patch, now)?;

        if let Some(sku) = item.sku.as_deref() {
            let sku_changed = !before.sku.as_deref().is_some_and(|old| same_sku(old, sku));
            if sku_changed {
                let existing = self.store.list_items(owner).await?;
                if sku_taken(&existing, sku, Some(id)) {
                    return Err(duplicate_sku(sku));
                }
            }
        }

        let movement = (item.quantity != before.quantity).then(|| {
            StockMovement::record(
                &before,
                MovementDirection::Set,
                item.quantity,
                Some(EDIT_REASON.to_string()),
                now,
            )
        });
        if let Some(movement) = &movement {
            self.store.insert_movement(movement).await?;
        }

        // Only write over the quantity this edit was based on.
        if let Err(err) = self.store.update_item(&item, before.quantity).await {
            if let Some(movement) = &movement {
                self.compensate(movement).await;
            }
            return Err(err.into());
        }

        info!(item_id = %id, "item updated");
        self.publish(owner, ChangeKind::Updated, id, Some(item.clone()));
        Ok(item)
    }

    /// Delete an item and its movement history.
    #[instrument(skip(self), fields(owner_id = %owner), err)]
    pub async fn delete_item(&self, owner: OwnerId, id: ItemId) -> ServiceResult<()> {
        if !self.store.delete_item(owner, id).await? {
            return Err(ServiceError::NotFound);
        }
        info!(item_id = %id, "item deleted");
        self.publish(owner, ChangeKind::Deleted, id, None);
        Ok(())
    }

    #[instrument(skip(self, query), fields(owner_id = %owner), err)]
    pub async fn search_items(
        &self,
        owner: OwnerId,
        query: &ItemQuery,
    ) -> ServiceResult<Page<InventoryItem>> {
        let items = self.store.list_items(owner).await?;
        Ok(query.run(items))
    }

    /// Items at or below their minimum, worst shortfall first.
    #[instrument(skip(self), fields(owner_id = %owner), err)]
    pub async fn low_stock_items(&self, owner: OwnerId) -> ServiceResult<Vec<InventoryItem>> {
        Ok(low_stock(self.store.list_items(owner).await?))
    }

    /// Record a movement and apply it to the item's quantity.
    #[instrument(
        skip(self, command),
        fields(owner_id = %owner, direction = %command.direction, amount = command.amount),
        err
    )]
    pub async fn adjust_stock(
        &self,
        owner: OwnerId,
        id: ItemId,
        command: AdjustStock,
    ) -> ServiceResult<AdjustOutcome> {
        let mut item = self.load(owner, id).await?;
        let plan = item.plan_adjustment(&command, Utc::now())?;

        self.store.insert_movement(&plan.movement).await?;

        if let Err(err) = self
            .store
            .update_quantity(
                owner,
                id,
                plan.movement.quantity_before,
                plan.new_quantity,
                plan.movement.created_at,
            )
            .await
        {
            self.compensate(&plan.movement).await;
            return Err(err.into());
        }

        item.apply_adjustment(&plan)?;
        info!(
            item_id = %id,
            before = plan.movement.quantity_before,
            after = plan.new_quantity,
            "stock adjusted"
        );
        self.publish(owner, ChangeKind::Adjusted, id, Some(item.clone()));
        Ok(AdjustOutcome {
            item,
            movement: plan.movement,
        })
    }

    async fn compensate(&self, movement: &StockMovement) {
        match self.store.delete_movement(movement.owner_id, movement.id).await {
            Ok(_) => warn!(movement_id = %movement.id, "rolled back movement after failed quantity update"),
            Err(err) => warn!(
                movement_id = %movement.id,
                error = %err,
                "failed to roll back movement; history may contain an orphaned entry"
            ),
        }
    }

    /// Movement history of one item, newest first.
    #[instrument(skip(self), fields(owner_id = %owner), err)]
    pub async fn movements_for(&self, owner: OwnerId, id: ItemId) -> ServiceResult<Vec<StockMovement>> {
        self.load(owner, id).await?;
        Ok(self.store.list_movements(owner, id).await?)
    }

    /// All of the owner's items as CSV, ordered by name.
    #[instrument(skip(self), fields(owner_id = %owner), err)]
    pub async fn export_csv(&self, owner: OwnerId) -> ServiceResult<String> {
        let mut items = self.store.list_items(owner).await?;
        items.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(export_items(&items))
    }

    /// Create one item per valid row. Bad rows, duplicate SKUs and per-row
    /// store failures are reported and do not stop the import.
    #[instrument(skip(self, csv), fields(owner_id = %owner, bytes = csv.len()), err)]
    pub async fn import_csv(&self, owner: OwnerId, csv: &str) -> ServiceResult<ImportSummary> {
        let parsed = import_items(csv)?;
        let mut summary = ImportSummary {
            imported: 0,
            errors: parsed.errors,
        };

        let mut existing = self.store.list_items(owner).await?;
        let now = Utc::now();

        for (line, input) in parsed.rows {
            let item = match InventoryItem::create(owner, input, now) {
                Ok(item) => item,
                Err(err) => {
                    summary.errors.push(RowError {
                        line,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            if let Some(sku) = item.sku.as_deref() {
                if sku_taken(&existing, sku, None) {
                    summary.errors.push(RowError {
                        line,
                        message: format!("an item with SKU '{sku}' already exists"),
                    });
                    continue;
                }
            }

            match self.store.insert_item(&item).await {
                Ok(()) => {
                    summary.imported += 1;
                    self.publish(owner, ChangeKind::Created, item.id, Some(item.clone()));
                    existing.push(item);
                }
                Err(err) => summary.errors.push(RowError {
                    line,
                    message: err.to_string(),
                }),
            }
        }

        summary.errors.sort_by_key(|e| e.line);
        info!(
            imported = summary.imported,
            rejected = summary.errors.len(),
            "csv import finished"
        );
        Ok(summary)
    }
}
