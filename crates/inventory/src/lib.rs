//! Inventory domain module.
//!
//! Business rules for inventory items, stock movements, list queries and CSV
//! interchange, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage).

pub mod csv;
pub mod item;
pub mod movement;
pub mod query;

pub use csv::{CsvError, CsvImport, RowError, export_items, import_items};
pub use item::{InventoryItem, ItemPatch, NewItem, Unit};
pub use movement::{AdjustStock, MovementDirection, StockAdjustment, StockMovement};
pub use query::{ItemQuery, Page, SortField, SortOrder, low_stock};
