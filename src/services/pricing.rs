//! Line-level price arithmetic shared by the resolver, the mutators and the
//! aggregator. Everything here is pure and works on exact decimals.

use crate::{
    entities::{labor_operation, quote_item, ItemType},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

pub const HUNDRED: Decimal = dec!(100);

/// Upper bound for a line quantity or a duration in hours.
pub const MAX_QUANTITY: Decimal = dec!(1000000);
/// Upper bound for a unit price, hourly rate or flat labor price.
pub const MAX_UNIT_AMOUNT: Decimal = dec!(1000000000);

/// Rejects a negative value or one above `max`.
///
/// Within these bounds no line, subtotal or tax computation can overflow.
pub fn check_range(field: &str, value: Option<Decimal>, max: Decimal) -> Result<(), ServiceError> {
    match value {
        Some(v) if v < Decimal::ZERO => Err(ServiceError::ValidationError(format!(
            "{} must not be negative",
            field
        ))),
        Some(v) if v > max => Err(ServiceError::ValidationError(format!(
            "{} must not exceed {}",
            field, max
        ))),
        _ => Ok(()),
    }
}

/// Clamps a percentage into `[0, 100]`.
pub fn clamp_pct(pct: Decimal) -> Decimal {
    pct.max(Decimal::ZERO).min(HUNDRED)
}

/// Gross amount of a line before its own discount.
///
/// Labor lines with both a duration and an hourly rate bill
/// `duration * rate`; every other line bills `quantity * unit_price`.
pub fn gross(
    item_type: ItemType,
    quantity: Decimal,
    unit_price: Decimal,
    duration_hours: Option<Decimal>,
    hourly_rate: Option<Decimal>,
) -> Decimal {
    match (item_type, duration_hours, hourly_rate) {
        (ItemType::Labor, Some(duration), Some(rate)) => duration * rate,
        _ => quantity * unit_price,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinePrice {
    pub gross: Decimal,
    pub discount_pct: Decimal,
    pub discount_amount: Decimal,
    pub total_price: Decimal,
}

/// Prices one line; `discount_pct` is clamped before use.
pub fn price_line(
    item_type: ItemType,
    quantity: Decimal,
    unit_price: Decimal,
    duration_hours: Option<Decimal>,
    hourly_rate: Option<Decimal>,
    discount_pct: Decimal,
) -> LinePrice {
    let gross = gross(item_type, quantity, unit_price, duration_hours, hourly_rate);
    let discount_pct = clamp_pct(discount_pct);
    let discount_amount = gross * discount_pct / HUNDRED;
    LinePrice {
        gross,
        discount_pct,
        discount_amount,
        total_price: gross - discount_amount,
    }
}

/// Re-prices a stored quote line from its own snapshot fields.
pub fn price_item(item: &quote_item::Model, discount_pct: Decimal) -> LinePrice {
    price_line(
        item.item_type,
        item.quantity,
        item.unit_price,
        item.duration_hours,
        item.hourly_rate,
        discount_pct,
    )
}

/// Snapshot of a labor operation as it lands on a quote line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaborSnapshot {
    pub unit_price: Decimal,
    pub duration_hours: Decimal,
    /// `None` for flat-priced operations, which bill `quantity * unit_price`.
    pub hourly_rate: Option<Decimal>,
}

/// Builds the labor snapshot for an optional duration override.
///
/// A flat `total_price` wins over `duration * rate`; the override then only
/// changes the displayed hours, not the price.
pub fn labor_snapshot(
    labor: &labor_operation::Model,
    duration_override: Option<Decimal>,
) -> LaborSnapshot {
    let duration_hours = duration_override.unwrap_or(labor.duration_hours);
    match labor.total_price {
        Some(flat) => LaborSnapshot {
            unit_price: flat,
            duration_hours,
            hourly_rate: None,
        },
        None => LaborSnapshot {
            unit_price: duration_hours * labor.hourly_rate,
            duration_hours,
            hourly_rate: Some(labor.hourly_rate),
        },
    }
}

/// List price of a labor operation without any override.
pub fn labor_list_price(labor: &labor_operation::Model) -> Decimal {
    labor
        .total_price
        .unwrap_or(labor.duration_hours * labor.hourly_rate)
}
