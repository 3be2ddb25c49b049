//! Stock adjustments and the movement history they leave behind.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, ItemId, MovementId, OwnerId};

use crate::item::InventoryItem;

pub const MAX_REASON_LEN: usize = 500;

/// Direction of a quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    /// Stock received; quantity increases by `amount`.
    In,
    /// Stock issued; quantity decreases by `amount`.
    Out,
    /// Stock count correction; quantity becomes `amount`.
    Set,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "in",
            MovementDirection::Out => "out",
            MovementDirection::Set => "set",
        }
    }
}

impl core::fmt::Display for MovementDirection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(MovementDirection::In),
            "out" => Ok(MovementDirection::Out),
            "set" => Ok(MovementDirection::Set),
            other => Err(DomainError::validation(format!(
                "unknown movement direction '{other}' (expected in, out or set)"
            ))),
        }
    }
}

/// Command: adjust the stock of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub direction: MovementDirection,
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Audit record of a single quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    pub item_id: ItemId,
    pub direction: MovementDirection,
    pub quantity_before: i64,
    pub quantity_after: i64,
    /// Signed difference `quantity_after - quantity_before`.
    pub change: i64,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Record a quantity change on `item` that has already been validated.
    pub fn record(
        item: &InventoryItem,
        direction: MovementDirection,
        quantity_after: i64,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            owner_id: item.owner_id,
            item_id: item.id,
            direction,
            quantity_before: item.quantity,
            quantity_after,
            change: quantity_after - item.quantity,
            reason,
            created_at: now,
        }
    }
}

impl Entity for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}

/// Outcome of planning an adjustment: the movement to record and the quantity
/// the item ends up with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAdjustment {
    pub movement: StockMovement,
    pub new_quantity: i64,
}

fn normalize_reason(reason: Option<&str>) -> DomainResult<Option<String>> {
    let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(DomainError::validation(format!(
            "reason cannot exceed {MAX_REASON_LEN} characters"
        )));
    }
    Ok(Some(reason.to_string()))
}

pub(crate) fn plan_adjustment(
    item: &InventoryItem,
    command: &AdjustStock,
    now: DateTime<Utc>,
) -> DomainResult<StockAdjustment> {
    let reason = normalize_reason(command.reason.as_deref())?;

    let new_quantity = match command.direction {
        MovementDirection::In => {
            if command.amount <= 0 {
                return Err(DomainError::validation("amount must be positive"));
            }
            item.quantity
                .checked_add(command.amount)
                .ok_or_else(|| DomainError::invariant("stock quantity overflow"))?
        }
        MovementDirection::Out => {
            if command.amount <= 0 {
                return Err(DomainError::validation("amount must be positive"));
            }
            let next = item.quantity - command.amount;
            if next < 0 {
                return Err(DomainError::invariant(format!(
                    "stock cannot go negative (on hand {}, requested {})",
                    item.quantity, command.amount
                )));
            }
            next
        }
        MovementDirection::Set => {
            if command.amount < 0 {
                return Err(DomainError::validation("quantity cannot be negative"));
            }
            if command.amount == item.quantity {
                return Err(DomainError::validation("quantity is already at that level"));
            }
            command.amount
        }
    };

    Ok(StockAdjustment {
        movement: StockMovement::record(item, command.direction, new_quantity, reason, now),
        new_quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::NewItem;

    fn item_with(quantity: i64) -> InventoryItem {
        InventoryItem::create(
            OwnerId::new(),
            NewItem {
                name: "Bolt".to_string(),
                quantity,
                ..NewItem::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn cmd(direction: MovementDirection, amount: i64) -> AdjustStock {
        AdjustStock {
            direction,
            amount,
            reason: None,
        }
    }

    #[test]
    fn stock_in_increases_and_records_before_after() {
        let item = item_with(5);
        let plan = item
            .plan_adjustment(&cmd(MovementDirection::In, 7), Utc::now())
            .unwrap();

        assert_eq!(plan.new_quantity, 12);
        assert_eq!(plan.movement.quantity_before, 5);
        assert_eq!(plan.movement.quantity_after, 12);
        assert_eq!(plan.movement.change, 7);
        assert_eq!(plan.movement.item_id, item.id);
        assert_eq!(plan.movement.owner_id, item.owner_id);
    }

    #[test]
    fn stock_out_cannot_go_negative() {
        let item = item_with(2);
        let err = item
            .plan_adjustment(&cmd(MovementDirection::Out, 3), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let plan = item
            .plan_adjustment(&cmd(MovementDirection::Out, 2), Utc::now())
            .unwrap();
        assert_eq!(plan.new_quantity, 0);
        assert_eq!(plan.movement.change, -2);
    }

    #[test]
    fn zero_or_negative_amounts_are_rejected() {
        let item = item_with(2);
        for direction in [MovementDirection::In, MovementDirection::Out] {
            assert!(item.plan_adjustment(&cmd(direction, 0), Utc::now()).is_err());
            assert!(item.plan_adjustment(&cmd(direction, -1), Utc::now()).is_err());
        }
        assert!(item
            .plan_adjustment(&cmd(MovementDirection::Set, -1), Utc::now())
            .is_err());
    }

    #[test]
    fn set_replaces_quantity_but_rejects_noop() {
        let item = item_with(9);
        let plan = item
            .plan_adjustment(&cmd(MovementDirection::Set, 4), Utc::now())
            .unwrap();
        assert_eq!(plan.new_quantity, 4);
        assert_eq!(plan.movement.change, -5);

        assert!(item
            .plan_adjustment(&cmd(MovementDirection::Set, 9), Utc::now())
            .is_err());
    }

    #[test]
    fn in_overflow_is_an_invariant_violation() {
        let item = item_with(i64::MAX);
        let err = item
            .plan_adjustment(&cmd(MovementDirection::In, 1), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn reason_is_trimmed_and_blank_becomes_none() {
        let item = item_with(1);
        let mut command = cmd(MovementDirection::In, 1);

        command.reason = Some("  delivery #42  ".to_string());
        let plan = item.plan_adjustment(&command, Utc::now()).unwrap();
        assert_eq!(plan.movement.reason.as_deref(), Some("delivery #42"));

        command.reason = Some("   ".to_string());
        let plan = item.plan_adjustment(&command, Utc::now()).unwrap();
        assert_eq!(plan.movement.reason, None);

        command.reason = Some("x".repeat(MAX_REASON_LEN + 1));
        assert!(item.plan_adjustment(&command, Utc::now()).is_err());
    }

    #[test]
    fn apply_adjustment_detects_stale_plan() {
        let mut item = item_with(5);
        let plan = item
            .plan_adjustment(&cmd(MovementDirection::Out, 1), Utc::now())
            .unwrap();

        item.quantity = 6;
        let err = item.apply_adjustment(&plan).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        item.quantity = 5;
        item.apply_adjustment(&plan).unwrap();
        assert_eq!(item.quantity, 4);
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("IN".parse::<MovementDirection>().unwrap(), MovementDirection::In);
        assert_eq!(" set ".parse::<MovementDirection>().unwrap(), MovementDirection::Set);
        assert!("sideways".parse::<MovementDirection>().is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: a successful plan never produces negative stock and the
            /// movement's change always equals after - before.
            #[test]
            fn plans_keep_stock_non_negative_and_consistent(
                start in 0i64..1_000_000,
                amount in -10i64..1_000_000,
                dir in prop_oneof![
                    Just(MovementDirection::In),
                    Just(MovementDirection::Out),
                    Just(MovementDirection::Set),
                ],
            ) {
                let item = item_with(start);
                if let Ok(plan) = item.plan_adjustment(&cmd(dir, amount), Utc::now()) {
                    prop_assert!(plan.new_quantity >= 0);
                    prop_assert_eq!(plan.movement.quantity_before, start);
                    prop_assert_eq!(plan.movement.quantity_after, plan.new_quantity);
                    prop_assert_eq!(
                        plan.movement.change,
                        plan.movement.quantity_after - plan.movement.quantity_before
                    );
                    prop_assert_ne!(plan.movement.change, 0);
                }
            }

            /// Property: planning is pure (same input, same outcome, item untouched).
            #[test]
            fn planning_does_not_mutate_item(start in 0i64..1000, amount in 1i64..1000) {
                let item = item_with(start);
                let before = item.clone();
                let a = item.plan_adjustment(&cmd(MovementDirection::Out, amount), Utc::now());
                let b = item.plan_adjustment(&cmd(MovementDirection::Out, amount), Utc::now());
                prop_assert_eq!(&item, &before);
                prop_assert_eq!(a.is_ok(), b.is_ok());
            }
        }
    }
}
