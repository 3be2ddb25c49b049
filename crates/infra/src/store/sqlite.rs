//! Local device storage on SQLite.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use stockroom_core::{ItemId, MovementId, OwnerId};
use stockroom_inventory::{InventoryItem, MovementDirection, StockMovement, Unit};

use super::{InventoryStore, StoreError, StoreResult, quantity_moved};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS inventory_items (
        id          TEXT NOT NULL PRIMARY KEY,
        user_id     TEXT NOT NULL,
        name        TEXT NOT NULL,
        sku         TEXT NULL,
        quantity    INTEGER NOT NULL,
        unit        TEXT NOT NULL,
        supplier    TEXT NULL,
        min_stock   INTEGER NULL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS inventory_items_user ON inventory_items (user_id)",
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS inventory_items_user_sku
        ON inventory_items (user_id, lower(sku)) WHERE sku IS NOT NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_movements (
        id               TEXT NOT NULL PRIMARY KEY,
        user_id          TEXT NOT NULL,
        item_id          TEXT NOT NULL,
        direction        TEXT NOT NULL,
        quantity_before  INTEGER NOT NULL,
        quantity_after   INTEGER NOT NULL,
        change           INTEGER NOT NULL,
        reason           TEXT NULL,
        created_at       TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS stock_movements_item ON stock_movements (user_id, item_id)",
];

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// SQLite-backed store (lazy initialization).
///
/// The pool and schema are created on first use, so constructing a store never
/// touches the filesystem.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    location: Location,
    pool: Arc<Mutex<Option<SqlitePool>>>,
}

impl SqliteStore {
    /// Store at `{data_dir}/stockroom/inventory.db`.
    pub fn open_default() -> anyhow::Result<Self> {
        Ok(Self::open(default_db_path()?))
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            pool: Arc::new(Mutex::new(None)),
        }
    }

    /// Private in-memory database, gone when the store is dropped.
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            pool: Arc::new(Mutex::new(None)),
        }
    }

    async fn connect(&self) -> anyhow::Result<SqlitePool> {
        let pool = match &self.location {
            Location::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create database directory at {parent:?}"))?;
                }
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true);
                SqlitePool::connect_with(options)
                    .await
                    .with_context(|| format!("failed to open SQLite database at {path:?}"))?
            }
            // One connection, otherwise every pooled connection sees its own empty database.
            Location::Memory => {
                let options = SqliteConnectOptions::from_str("sqlite::memory:")
                    .context("invalid in-memory SQLite url")?;
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await
                    .context("failed to open in-memory SQLite database")?
            }
        };

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .context("failed to create inventory schema")?;
        }

        tracing::info!(location = ?self.location, "sqlite store initialized");
        Ok(pool)
    }

    async fn pool(&self) -> StoreResult<SqlitePool> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }
        let pool = self
            .connect()
            .await
            .map_err(|e| StoreError::Backend(format!("{e:#}")))?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// Explain a conditional write that matched no row.
    async fn compare_failed(&self, owner: OwnerId, id: ItemId, expected: i64) -> StoreError {
        match self.get_item(owner, id).await {
            Ok(Some(current)) => quantity_moved(current.quantity, expected),
            Ok(None) => StoreError::NotFound,
            Err(err) => err,
        }
    }
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let mut dir = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;
    dir.push("stockroom");
    dir.push("inventory.db");
    Ok(dir)
}

fn db_err(err: sqlx::Error) -> StoreError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Backend(err.to_string())
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("bad timestamp '{raw}': {e}")))
}

fn parse_col<T: FromStr>(row: &SqliteRow, col: &str) -> StoreResult<T>
where
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(col).map_err(db_err)?;
    raw.parse::<T>()
        .map_err(|e| StoreError::Decode(format!("column {col}: {e}")))
}

fn item_from_row(row: &SqliteRow) -> StoreResult<InventoryItem> {
    let unit: String = row.try_get("unit").map_err(db_err)?;
    let created_at: String = row.try_get("created_at").map_err(db_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(db_err)?;
    Ok(InventoryItem {
        id: parse_col(row, "id")?,
        owner_id: parse_col(row, "user_id")?,
        name: row.try_get("name").map_err(db_err)?,
        sku: row.try_get("sku").map_err(db_err)?,
        quantity: row.try_get("quantity").map_err(db_err)?,
        unit: Unit::parse(&unit).map_err(|e| StoreError::Decode(e.to_string()))?,
        supplier: row.try_get("supplier").map_err(db_err)?,
        min_stock: row.try_get("min_stock").map_err(db_err)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn movement_from_row(row: &SqliteRow) -> StoreResult<StockMovement> {
    let created_at: String = row.try_get("created_at").map_err(db_err)?;
    Ok(StockMovement {
        id: parse_col(row, "id")?,
        owner_id: parse_col(row, "user_id")?,
        item_id: parse_col(row, "item_id")?,
        direction: parse_col::<MovementDirection>(row, "direction")?,
        quantity_before: row.try_get("quantity_before").map_err(db_err)?,
        quantity_after: row.try_get("quantity_after").map_err(db_err)?,
        change: row.try_get("change").map_err(db_err)?,
        reason: row.try_get("reason").map_err(db_err)?,
        created_at: parse_ts(&created_at)?,
    })
}

#[async_trait::async_trait]
impl InventoryStore for SqliteStore {
    async fn list_items(&self, owner: OwnerId) -> StoreResult<Vec<InventoryItem>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT * FROM inventory_items WHERE user_id = ?1")
            .bind(owner.to_string())
            .fetch_all(&pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(item_from_row).collect()
    }

    async fn get_item(&self, owner: OwnerId, id: ItemId) -> StoreResult<Option<InventoryItem>> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT * FROM inventory_items WHERE user_id = ?1 AND id = ?2")
            .bind(owner.to_string())
            .bind(id.to_string())
            .fetch_optional(&pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn insert_item(&self, item: &InventoryItem) -> StoreResult<()> {
        let pool = self.pool().await?;
        sqlx::query(
            r#"
            INSERT INTO inventory_items
                (id, user_id, name, sku, quantity, unit, supplier, min_stock, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.owner_id.to_string())
        .bind(&item.name)
        .bind(&item.sku)
        .bind(item.quantity)
        .bind(item.unit.as_str())
        .bind(&item.supplier)
        .bind(item.min_stock)
        .bind(ts(&item.created_at))
        .bind(ts(&item.updated_at))
        .execute(&pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_item(&self, item: &InventoryItem, expected_quantity: i64) -> StoreResult<()> {
        let pool = self.pool().await?;
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET name = ?3, sku = ?4, quantity = ?5, unit = ?6, supplier = ?7,
                min_stock = ?8, updated_at = ?9
            WHERE user_id = ?1 AND id = ?2 AND quantity = ?10
            "#,
        )
        .bind(item.owner_id.to_string())
        .bind(item.id.to_string())
        .bind(&item.name)
        .bind(&item.sku)
        .bind(item.quantity)
        .bind(item.unit.as_str())
        .bind(&item.supplier)
        .bind(item.min_stock)
        .bind(ts(&item.updated_at))
        .bind(expected_quantity)
        .execute(&pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(self.compare_failed(item.owner_id, item.id, expected_quantity).await);
        }
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
        let pool = self.pool().await?;
        let result = sqlx::query(
            r#"
            UPDATE inventory_items SET quantity = ?4, updated_at = ?5
            WHERE user_id = ?1 AND id = ?2 AND quantity = ?3
            "#,
        )
        .bind(owner.to_string())
        .bind(id.to_string())
        .bind(expected)
        .bind(quantity)
        .bind(ts(&updated_at))
        .execute(&pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(self.compare_failed(owner, id, expected).await);
        }
        Ok(())
    }

    async fn delete_item(&self, owner: OwnerId, id: ItemId) -> StoreResult<bool> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await.map_err(db_err)?;
        let deleted = sqlx::query("DELETE FROM inventory_items WHERE user_id = ?1 AND id = ?2")
            .bind(owner.to_string())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();
        sqlx::query("DELETE FROM stock_movements WHERE user_id = ?1 AND item_id = ?2")
            .bind(owner.to_string())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(deleted > 0)
    }

    async fn insert_movement(&self, movement: &StockMovement) -> StoreResult<()> {
        let pool = self.pool().await?;
        sqlx::query(
            r#"
            INSERT INTO stock_movements
                (id, user_id, item_id, direction, quantity_before, quantity_after, change, reason, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(movement.id.to_string())
        .bind(movement.owner_id.to_string())
        .bind(movement.item_id.to_string())
        .bind(movement.direction.as_str())
        .bind(movement.quantity_before)
        .bind(movement.quantity_after)
        .bind(movement.change)
        .bind(&movement.reason)
        .bind(ts(&movement.created_at))
        .execute(&pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_movement(&self, owner: OwnerId, id: MovementId) -> StoreResult<bool> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM stock_movements WHERE user_id = ?1 AND id = ?2")
            .bind(owner.to_string())
            .bind(id.to_string())
            .execute(&pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_movements(&self, owner: OwnerId, item_id: ItemId) -> StoreResult<Vec<StockMovement>> {
        let pool = self.pool().await?;
        let rows = sqlx::query(
            r#"
            SELECT * FROM stock_movements
            WHERE user_id = ?1 AND item_id = ?2
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(owner.to_string())
        .bind(item_id.to_string())
        .fetch_all(&pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(movement_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stockroom_inventory::{AdjustStock, NewItem};

    fn new_item(owner: OwnerId, name: &str, sku: Option<&str>) -> InventoryItem {
        InventoryItem::create(
            owner,
            NewItem {
                name: name.to_string(),
                sku: sku.map(str::to_string),
                quantity: 10,
                unit: Some("box".to_string()),
                supplier: Some("Acme, Inc.".to_string()),
                min_stock: Some(3),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn item_round_trips_through_sqlite() {
        let store = SqliteStore::in_memory();
        let owner = OwnerId::new();
        let item = new_item(owner, "Widget", Some("W-1"));

        store.insert_item(&item).await.unwrap();
        let loaded = store.get_item(owner, item.id).await.unwrap().unwrap();
        assert_eq!(loaded, item);

        let other = OwnerId::new();
        assert!(store.get_item(other, item.id).await.unwrap().is_none());
        assert!(store.list_items(other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_and_compare_and_set() {
        let store = SqliteStore::in_memory();
        let owner = OwnerId::new();
        let mut item = new_item(owner, "Widget", None);
        store.insert_item(&item).await.unwrap();

        item.name = "Gadget".to_string();
        item.sku = Some("G-1".to_string());
        store.update_item(&item, 10).await.unwrap();
        assert_eq!(store.get_item(owner, item.id).await.unwrap().unwrap().name, "Gadget");

        let stale_edit = store.update_item(&item, 7).await;
        assert!(matches!(stale_edit, Err(StoreError::Conflict(_))));
        let mut ghost = item.clone();
        ghost.id = ItemId::new();
        assert!(matches!(store.update_item(&ghost, 10).await, Err(StoreError::NotFound)));

        let stale = store.update_quantity(owner, item.id, 99, 1, Utc::now()).await;
        assert!(matches!(stale, Err(StoreError::Conflict(_))));
        let missing = store.update_quantity(owner, ItemId::new(), 10, 1, Utc::now()).await;
        assert!(matches!(missing, Err(StoreError::NotFound)));

        store.update_quantity(owner, item.id, 10, 4, Utc::now()).await.unwrap();
        assert_eq!(store.get_item(owner, item.id).await.unwrap().unwrap().quantity, 4);
    }

    #[tokio::test]
    async fn movements_are_newest_first_and_cascade_on_delete() {
        let store = SqliteStore::in_memory();
        let owner = OwnerId::new();
        let item = new_item(owner, "Widget", None);
        store.insert_item(&item).await.unwrap();

        let t0 = Utc::now();
        let first = item
            .plan_adjustment(
                &AdjustStock {
                    direction: MovementDirection::In,
                    amount: 1,
                    reason: Some("delivery".to_string()),
                },
                t0,
            )
            .unwrap();
        let second = item
            .plan_adjustment(
                &AdjustStock {
                    direction: MovementDirection::Out,
                    amount: 2,
                    reason: None,
                },
                t0 + Duration::seconds(1),
            )
            .unwrap();
        store.insert_movement(&first.movement).await.unwrap();
        store.insert_movement(&second.movement).await.unwrap();

        let history = store.list_movements(owner, item.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], second.movement);
        assert_eq!(history[1], first.movement);

        assert!(store.delete_movement(owner, first.movement.id).await.unwrap());
        assert!(!store.delete_movement(owner, first.movement.id).await.unwrap());

        assert!(store.delete_item(owner, item.id).await.unwrap());
        assert!(store.list_movements(owner, item.id).await.unwrap().is_empty());
        assert!(!store.delete_item(owner, item.id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_primary_key_is_a_conflict() {
        let store = SqliteStore::in_memory();
        let item = new_item(OwnerId::new(), "Widget", None);
        store.insert_item(&item).await.unwrap();
        assert!(matches!(store.insert_item(&item).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn sku_is_unique_per_owner_ignoring_case() {
        let store = SqliteStore::in_memory();
        let owner = OwnerId::new();
        store.insert_item(&new_item(owner, "Widget", Some("W-1"))).await.unwrap();

        let clash = store.insert_item(&new_item(owner, "Other", Some("w-1"))).await;
        assert!(matches!(clash, Err(StoreError::Conflict(_))));

        let mut other = new_item(owner, "Other", Some("W-2"));
        store.insert_item(&other).await.unwrap();
        other.sku = Some("W-1".to_string());
        assert!(matches!(store.update_item(&other, 10).await, Err(StoreError::Conflict(_))));

        store.insert_item(&new_item(owner, "No sku", None)).await.unwrap();
        store.insert_item(&new_item(owner, "No sku either", None)).await.unwrap();
        store
            .insert_item(&new_item(OwnerId::new(), "Widget", Some("W-1")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn file_backed_store_creates_parent_directories() {
        let dir = std::env::temp_dir().join(format!("stockroom-test-{}", ItemId::new()));
        let path = dir.join("nested").join("inventory.db");
        let store = SqliteStore::open(&path);
        let owner = OwnerId::new();
        store.insert_item(&new_item(owner, "Widget", None)).await.unwrap();

        let reopened = SqliteStore::open(&path);
        assert_eq!(reopened.list_items(owner).await.unwrap().len(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }
}
