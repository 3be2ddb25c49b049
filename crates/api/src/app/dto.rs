use serde::{Deserialize, Serialize};

use stockroom_core::ItemId;
use stockroom_inventory::{AdjustStock, MovementDirection, StockMovement};

use crate::app::errors;
use axum::http::StatusCode;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /items/:id/adjust`. Direction is accepted in any case.
#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub direction: String,
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AdjustStockRequest {
    pub fn into_command(self) -> Result<AdjustStock, axum::response::Response> {
        let direction: MovementDirection = self.direction.parse().map_err(|e: stockroom_core::DomainError| {
            errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        })?;
        Ok(AdjustStock {
            direction,
            amount: self.amount,
            reason: self.reason,
        })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub owner_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MovementsResponse {
    pub item_id: ItemId,
    pub movements: Vec<StockMovement>,
}

// -------------------------
// Helpers
// -------------------------

pub fn parse_item_id(raw: &str) -> Result<ItemId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id"))
}
