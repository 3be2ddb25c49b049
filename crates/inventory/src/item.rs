use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, ItemId, OwnerId, ValueObject};

use crate::movement::{AdjustStock, StockAdjustment, plan_adjustment};

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_SKU_LEN: usize = 64;
pub const MAX_SUPPLIER_LEN: usize = 200;
pub const MAX_UNIT_LEN: usize = 32;

/// Unit of measure an item is counted in ("pcs", "kg", "box").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unit(String);

impl Unit {
    pub const DEFAULT: &'static str = "pcs";

    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        if trimmed.chars().count() > MAX_UNIT_LEN {
            return Err(DomainError::validation(format!(
                "unit cannot exceed {MAX_UNIT_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Unit {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl core::fmt::Display for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for Unit {}

/// A tracked stock-keeping record.
///
/// Fields are public so storage adapters can hydrate rows directly; new
/// records should be built with [`InventoryItem::create`] and changed through
/// [`InventoryItem::apply_patch`] / [`InventoryItem::apply_adjustment`] so the
/// validation rules hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i64,
    pub unit: Unit,
    pub supplier: Option<String>,
    pub min_stock: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub min_stock: Option<i64>,
}

/// Partial update. Absent fields are left untouched; `null` clears an
/// optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub sku: Option<Option<String>>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub supplier: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub min_stock: Option<Option<i64>>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self == &ItemPatch::default()
    }
}

fn explicit_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Fully validated field values shared by create and patch.
struct Fields {
    name: String,
    sku: Option<String>,
    quantity: i64,
    unit: Unit,
    supplier: Option<String>,
    min_stock: Option<i64>,
}

impl NewItem {
    /// Validate without building an item (used by CSV import to report rows).
    pub fn validate(&self) -> DomainResult<()> {
        self.clone().into_fields().map(|_| ())
    }

    fn into_fields(self) -> DomainResult<Fields> {
        let unit = match self.unit.as_deref() {
            Some(u) if !u.trim().is_empty() => Unit::parse(u)?,
            _ => Unit::default(),
        };
        Ok(Fields {
            name: validate_name(&self.name)?,
            sku: validate_optional("sku", self.sku, MAX_SKU_LEN)?,
            quantity: validate_quantity(self.quantity)?,
            unit,
            supplier: validate_optional("supplier", self.supplier, MAX_SUPPLIER_LEN)?,
            min_stock: validate_min_stock(self.min_stock)?,
        })
    }
}

fn validate_name(raw: &str) -> DomainResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "name cannot exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_optional(
    field: &str,
    raw: Option<String>,
    max_len: usize,
) -> DomainResult<Option<String>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max_len {
        return Err(DomainError::validation(format!(
            "{field} cannot exceed {max_len} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

fn validate_quantity(quantity: i64) -> DomainResult<i64> {
    if quantity < 0 {
        return Err(DomainError::validation("quantity cannot be negative"));
    }
    Ok(quantity)
}

fn validate_min_stock(min_stock: Option<i64>) -> DomainResult<Option<i64>> {
    match min_stock {
        Some(m) if m < 0 => Err(DomainError::validation("min_stock cannot be negative")),
        other => Ok(other),
    }
}

impl InventoryItem {
    /// Build a new item for `owner_id` from validated input.
    pub fn create(owner_id: OwnerId, input: NewItem, now: DateTime<Utc>) -> DomainResult<Self> {
        Self::create_with_id(ItemId::new(), owner_id, input, now)
    }

    pub fn create_with_id(
        id: ItemId,
        owner_id: OwnerId,
        input: NewItem,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let fields = input.into_fields()?;
        Ok(Self {
            id,
            owner_id,
            name: fields.name,
            sku: fields.sku,
            quantity: fields.quantity,
            unit: fields.unit,
            supplier: fields.supplier,
            min_stock: fields.min_stock,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial edit. Either every field is applied or none is.
    pub fn apply_patch(&mut self, patch: ItemPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let merged = NewItem {
            name: patch.name.unwrap_or_else(|| self.name.clone()),
            sku: patch.sku.unwrap_or_else(|| self.sku.clone()),
            quantity: patch.quantity.unwrap_or(self.quantity),
            unit: Some(patch.unit.unwrap_or_else(|| self.unit.as_str().to_string())),
            supplier: patch.supplier.unwrap_or_else(|| self.supplier.clone()),
            min_stock: patch.min_stock.unwrap_or(self.min_stock),
        };
        let fields = merged.into_fields()?;

        self.name = fields.name;
        self.sku = fields.sku;
        self.quantity = fields.quantity;
        self.unit = fields.unit;
        self.supplier = fields.supplier;
        self.min_stock = fields.min_stock;
        self.updated_at = now;
        Ok(())
    }

    /// Quantity at or below the configured minimum.
    pub fn is_low_stock(&self) -> bool {
        matches!(self.min_stock, Some(min) if self.quantity <= min)
    }

    /// How many units are missing to get back to the threshold (0 if not low).
    pub fn shortfall(&self) -> i64 {
        match self.min_stock {
            Some(min) if self.quantity <= min => min - self.quantity,
            _ => 0,
        }
    }

    /// Decide the effect of a stock adjustment without mutating the item.
    pub fn plan_adjustment(
        &self,
        command: &AdjustStock,
        now: DateTime<Utc>,
    ) -> DomainResult<StockAdjustment> {
        plan_adjustment(self, command, now)
    }

    /// Apply a previously planned adjustment.
    pub fn apply_adjustment(&mut self, adjustment: &StockAdjustment) -> DomainResult<()> {
        let movement = &adjustment.movement;
        if movement.item_id != self.id {
            return Err(DomainError::invariant("movement item_id mismatch"));
        }
        if movement.quantity_before != self.quantity {
            return Err(DomainError::conflict(format!(
                "stock changed since the adjustment was planned (expected {}, found {})",
                movement.quantity_before, self.quantity
            )));
        }
        self.quantity = adjustment.new_quantity;
        self.updated_at = movement.created_at;
        Ok(())
    }
}

impl Entity for InventoryItem {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}
