use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use stockroom_core::{ItemId, MovementId, OwnerId};
use stockroom_inventory::{InventoryItem, StockMovement};

use super::{InventoryStore, StoreError, StoreResult, quantity_moved, sku_taken, sort_movements};

type ItemMap = HashMap<(OwnerId, ItemId), InventoryItem>;

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

fn check_sku(map: &ItemMap, item: &InventoryItem) -> StoreResult<()> {
    let Some(sku) = item.sku.as_deref() else {
        return Ok(());
    };
    let taken = map.values().any(|other| {
        other.owner_id == item.owner_id
            && other.id != item.id
            && other.sku.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(sku))
    });
    if taken { Err(sku_taken(sku)) } else { Ok(()) }
}

/// In-memory owner-isolated store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: RwLock<ItemMap>,
    movements: RwLock<HashMap<(OwnerId, MovementId), StockMovement>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl InventoryStore for InMemoryStore {
    async fn list_items(&self, owner: OwnerId) -> StoreResult<Vec<InventoryItem>> {
        let map = self.items.read().map_err(poisoned)?;
        Ok(map
            .iter()
            .filter_map(|((o, _), item)| (*o == owner).then(|| item.clone()))
            .collect())
    }

    async fn get_item(&self, owner: OwnerId, id: ItemId) -> StoreResult<Option<InventoryItem>> {
        let map = self.items.read().map_err(poisoned)?;
        Ok(map.get(&(owner, id)).cloned())
    }

    async fn insert_item(&self, item: &InventoryItem) -> StoreResult<()> {
        let mut map = self.items.write().map_err(poisoned)?;
        let key = (item.owner_id, item.id);
        if map.contains_key(&key) {
            return Err(StoreError::Conflict(format!("item {} already exists", item.id)));
        }
        check_sku(&map, item)?;
        map.insert(key, item.clone());
        Ok(())
    }

    async fn update_item(&self, item: &InventoryItem, expected_quantity: i64) -> StoreResult<()> {
        let mut map = self.items.write().map_err(poisoned)?;
        let current = map
            .get(&(item.owner_id, item.id))
            .ok_or(StoreError::NotFound)?
            .quantity;
        if current != expected_quantity {
            return Err(quantity_moved(current, expected_quantity));
        }
        check_sku(&map, item)?;
        map.insert((item.owner_id, item.id), item.clone());
        Ok(())
    }

    async fn update_quantity(
        &self,
        owner: OwnerId,
        id: ItemId,
        expected: i64,
        quantity: i64,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut map = self.items.write().map_err(poisoned)?;
        let item = map.get_mut(&(owner, id)).ok_or(StoreError::NotFound)?;
        if item.quantity != expected {
            return Err(quantity_moved(item.quantity, expected));
        }
        item.quantity = quantity;
        item.updated_at = updated_at;
        Ok(())
    }

    async fn delete_item(&self, owner: OwnerId, id: ItemId) -> StoreResult<bool> {
        let existed = self.items.write().map_err(poisoned)?.remove(&(owner, id)).is_some();
        if existed {
            self.movements
                .write()
                .map_err(poisoned)?
                .retain(|(o, _), m| !(*o == owner && m.item_id == id));
        }
        Ok(existed)
    }

    async fn insert_movement(&self, movement: &StockMovement) -> StoreResult<()> {
        let mut map = self.movements.write().map_err(poisoned)?;
        let key = (movement.owner_id, movement.id);
        if map.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "movement {} already exists",
                movement.id
            )));
        }
        map.insert(key, movement.clone());
        Ok(())
    }

    async fn delete_movement(&self, owner: OwnerId, id: MovementId) -> StoreResult<bool> {
        Ok(self
            .movements
            .write()
            .map_err(poisoned)?
            .remove(&(owner, id))
            .is_some())
    }

    async fn list_movements(&self, owner: OwnerId, item_id: ItemId) -> StoreResult<Vec<StockMovement>> {
        let map = self.movements.read().map_err(poisoned)?;
        let mut out: Vec<StockMovement> = map
            .iter()
            .filter_map(|((o, _), m)| (*o == owner && m.item_id == item_id).then(|| m.clone()))
            .collect();
        sort_movements(&mut out);
        Ok(out)
    }
}
