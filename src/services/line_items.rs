use crate::{
    db::record_transaction,
    entities::{quote_item, DiscountSource, ItemType},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        aggregator::{recalculate_quote_totals, QuoteDetails},
        catalog_index::CatalogIndex,
        pricing::{self, check_range, price_line, MAX_QUANTITY, MAX_UNIT_AMOUNT},
        quote_locks::QuoteLockRegistry,
        quotes::{ensure_draft, find_quote},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Input for adding a line to a DRAFT quote.
///
/// `name`, `unit_price`, `duration_hours` and `hourly_rate` override the
/// catalog snapshot when supplied. On labor lines `unit_price` is a flat
/// price and `hourly_rate` bills by duration, so at most one may be given.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AddQuoteItemInput {
    pub item_type: ItemType,
    #[validate(length(min = 1, max = 64))]
    pub reference_code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
    pub discount_pct: Option<Decimal>,
    pub duration_hours: Option<Decimal>,
    pub hourly_rate: Option<Decimal>,
}

/// Partial update of a quote line; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpdateQuoteItemInput {
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub discount_pct: Option<Decimal>,
    pub duration_hours: Option<Decimal>,
}

struct Snapshot {
    name: String,
    unit_price: Decimal,
    duration_hours: Option<Decimal>,
    hourly_rate: Option<Decimal>,
}

impl AddQuoteItemInput {
    fn check_values(&self) -> Result<(), ServiceError> {
        check_range("quantity", Some(self.quantity), MAX_QUANTITY)?;
        check_range("unit_price", self.unit_price, MAX_UNIT_AMOUNT)?;
        check_range("duration_hours", self.duration_hours, MAX_QUANTITY)?;
        check_range("hourly_rate", self.hourly_rate, MAX_UNIT_AMOUNT)?;
        if self.item_type == ItemType::Labor
            && self.unit_price.is_some()
            && self.hourly_rate.is_some()
        {
            return Err(ServiceError::ValidationError(
                "labor lines take either a flat unit_price or an hourly_rate, not both"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl UpdateQuoteItemInput {
    fn check_values(&self) -> Result<(), ServiceError> {
        check_range("quantity", self.quantity, MAX_QUANTITY)?;
        check_range("unit_price", self.unit_price, MAX_UNIT_AMOUNT)?;
        check_range("duration_hours", self.duration_hours, MAX_QUANTITY)
    }
}

/// Add, update and remove operations on the lines of a DRAFT quote.
#[derive(Clone)]
pub struct LineItemService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    locks: QuoteLockRegistry,
}

impl LineItemService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        locks: QuoteLockRegistry,
    ) -> Self {
        Self {
            db,
            event_sender,
            locks,
        }
    }

    /// Appends a line after the current last line and recomputes totals.
    #[instrument(skip(self, input), fields(reference_code = %input.reference_code))]
    pub async fn add_item(
        &self,
        quote_id: Uuid,
        input: AddQuoteItemInput,
    ) -> Result<QuoteDetails, ServiceError> {
        input.validate()?;
        input.check_values()?;

        let _guard = self.locks.lock(quote_id).await;
        let started = Instant::now();
        let txn = self.db.begin().await?;

        let quote = find_quote(&txn, quote_id).await?;
        ensure_draft(&quote)?;

        let snapshot = self.snapshot(&txn, quote.brand_id, &input).await?;

        let sort_order = quote_item::Entity::find()
            .filter(quote_item::Column::QuoteId.eq(quote_id))
            .order_by_desc(quote_item::Column::SortOrder)
            .one(&txn)
            .await?
            .map(|last| last.sort_order + 1)
            .unwrap_or(0);

        let requested_pct = input.discount_pct.unwrap_or(Decimal::ZERO);
        let line = price_line(
            input.item_type,
            input.quantity,
            snapshot.unit_price,
            snapshot.duration_hours,
            snapshot.hourly_rate,
            requested_pct,
        );
        let discount_source = if input.discount_pct.is_some() && line.discount_pct > Decimal::ZERO {
            DiscountSource::Manual
        } else {
            DiscountSource::None
        };

        let now = Utc::now();
        let item_id = Uuid::new_v4();
        quote_item::ActiveModel {
            id: Set(item_id),
            quote_id: Set(quote_id),
            item_type: Set(input.item_type),
            reference_code: Set(input.reference_code.trim().to_string()),
            name: Set(snapshot.name),
            quantity: Set(input.quantity),
            unit_price: Set(snapshot.unit_price),
            discount_pct: Set(line.discount_pct),
            discount_amount: Set(line.discount_amount),
            total_price: Set(line.total_price),
            duration_hours: Set(snapshot.duration_hours),
            hourly_rate: Set(snapshot.hourly_rate),
            sort_order: Set(sort_order),
            discount_source: Set(discount_source),
            discount_preset: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let details = recalculate_quote_totals(&txn, quote).await?;
        txn.commit().await?;
        record_transaction("add_quote_item", started, true);

        self.event_sender
            .send_or_log(Event::QuoteItemAdded { quote_id, item_id })
            .await;

        info!(
            "Added {} {} to quote {} at position {}",
            input.item_type, input.reference_code, quote_id, sort_order
        );
        Ok(details)
    }

    /// Deletes one line and recomputes totals.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        quote_id: Uuid,
        item_id: Uuid,
    ) -> Result<QuoteDetails, ServiceError> {
        let _guard = self.locks.lock(quote_id).await;
        let started = Instant::now();
        let txn = self.db.begin().await?;

        let quote = find_quote(&txn, quote_id).await?;
        let item = find_item(&txn, quote_id, item_id).await?;
        ensure_draft(&quote)?;

        item.delete(&txn).await?;

        let details = recalculate_quote_totals(&txn, quote).await?;
        txn.commit().await?;
        record_transaction("remove_quote_item", started, true);

        self.event_sender
            .send_or_log(Event::QuoteItemRemoved { quote_id, item_id })
            .await;

        info!("Removed item {} from quote {}", item_id, quote_id);
        Ok(details)
    }

    /// Merges `input` over the line, re-prices it and recomputes totals.
    ///
    /// `discount_pct` is clamped into `[0, 100]`; negative or oversized
    /// quantity, price or duration is a validation error. A new `unit_price`
    /// on an hourly labor line turns it into a flat-priced line.
    #[instrument(skip(self, input))]
    pub async fn update_item(
        &self,
        quote_id: Uuid,
        item_id: Uuid,
        input: UpdateQuoteItemInput,
    ) -> Result<QuoteDetails, ServiceError> {
        input.check_values()?;

        let _guard = self.locks.lock(quote_id).await;
        let started = Instant::now();
        let txn = self.db.begin().await?;

        let quote = find_quote(&txn, quote_id).await?;
        let item = find_item(&txn, quote_id, item_id).await?;
        ensure_draft(&quote)?;

        let quantity = input.quantity.unwrap_or(item.quantity);
        let duration_hours = input.duration_hours.or(item.duration_hours);
        let (unit_price, hourly_rate) = match (item.item_type, item.hourly_rate, input.unit_price) {
            (ItemType::Labor, Some(_), Some(flat)) => (flat, None),
            (ItemType::Labor, Some(rate), None) => (
                duration_hours.map_or(item.unit_price, |hours| hours * rate),
                Some(rate),
            ),
            (_, rate, price) => (price.unwrap_or(item.unit_price), rate),
        };
        let line = price_line(
            item.item_type,
            quantity,
            unit_price,
            duration_hours,
            hourly_rate,
            input.discount_pct.unwrap_or(item.discount_pct),
        );

        let mut active: quote_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.unit_price = Set(unit_price);
        active.duration_hours = Set(duration_hours);
        active.hourly_rate = Set(hourly_rate);
        active.discount_pct = Set(line.discount_pct);
        active.discount_amount = Set(line.discount_amount);
        active.total_price = Set(line.total_price);
        if input.discount_pct.is_some() {
            active.discount_source = Set(DiscountSource::Manual);
            active.discount_preset = Set(None);
        }
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let details = recalculate_quote_totals(&txn, quote).await?;
        txn.commit().await?;
        record_transaction("update_quote_item", started, true);

        self.event_sender
            .send_or_log(Event::QuoteItemUpdated { quote_id, item_id })
            .await;

        info!(
            "Updated item {} on quote {}: total {}",
            item_id, quote_id, line.total_price
        );
        Ok(details)
    }

    /// Name and price snapshot for a new line: catalog first, caller overrides.
    async fn snapshot<C: ConnectionTrait>(
        &self,
        conn: &C,
        brand_id: Uuid,
        input: &AddQuoteItemInput,
    ) -> Result<Snapshot, ServiceError> {
        let code = input.reference_code.trim();
        let catalog = CatalogIndex::lookup(conn, brand_id, [(input.item_type, code)]).await?;

        let base = match input.item_type {
            ItemType::Part => catalog.part(code).map(|part| Snapshot {
                name: part.name.clone(),
                unit_price: part.unit_price,
                duration_hours: None,
                hourly_rate: None,
            }),
            ItemType::Labor => catalog.labor(code).map(|labor| {
                let snap = pricing::labor_snapshot(labor, input.duration_hours);
                Snapshot {
                    name: labor.name.clone(),
                    unit_price: snap.unit_price,
                    duration_hours: Some(snap.duration_hours),
                    hourly_rate: snap.hourly_rate,
                }
            }),
        };

        match base {
            Some(mut snap) => {
                if let Some(name) = &input.name {
                    snap.name = name.clone();
                }
                match (input.item_type, input.unit_price, input.hourly_rate) {
                    (ItemType::Labor, Some(flat), _) => {
                        snap.unit_price = flat;
                        snap.hourly_rate = None;
                    }
                    (ItemType::Labor, None, Some(rate)) => {
                        let hours = snap.duration_hours.unwrap_or(Decimal::ONE);
                        snap.unit_price = hours * rate;
                        snap.hourly_rate = Some(rate);
                    }
                    (ItemType::Part, Some(price), _) => snap.unit_price = price,
                    _ => {}
                }
                Ok(snap)
            }
            None => {
                let name = input.name.clone().ok_or_else(|| not_in_catalog(input))?;
                match (
                    input.item_type,
                    input.duration_hours,
                    input.hourly_rate,
                    input.unit_price,
                ) {
                    (ItemType::Labor, Some(duration), Some(rate), None) => Ok(Snapshot {
                        name,
                        unit_price: duration * rate,
                        duration_hours: Some(duration),
                        hourly_rate: Some(rate),
                    }),
                    (ItemType::Labor, duration_hours, _, Some(unit_price)) => Ok(Snapshot {
                        name,
                        unit_price,
                        duration_hours,
                        hourly_rate: None,
                    }),
                    (ItemType::Part, _, _, Some(unit_price)) => Ok(Snapshot {
                        name,
                        unit_price,
                        duration_hours: None,
                        hourly_rate: None,
                    }),
                    _ => Err(not_in_catalog(input)),
                }
            }
        }
    }
}

fn not_in_catalog(input: &AddQuoteItemInput) -> ServiceError {
    ServiceError::NotFound(format!(
        "{} {} is not in the catalog and no name and price were supplied",
        input.item_type, input.reference_code
    ))
}

async fn find_item<C: ConnectionTrait>(
    conn: &C,
    quote_id: Uuid,
    item_id: Uuid,
) -> Result<quote_item::Model, ServiceError> {
    quote_item::Entity::find_by_id(item_id)
        .one(conn)
        .await?
        .filter(|item| item.quote_id == quote_id)
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Item {} not found on quote {}",
                item_id, quote_id
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn labor_input() -> AddQuoteItemInput {
        AddQuoteItemInput {
            item_type: ItemType::Labor,
            reference_code: "L-SERVICE".into(),
            name: None,
            quantity: dec!(1),
            unit_price: None,
            discount_pct: None,
            duration_hours: None,
            hourly_rate: None,
        }
    }

    #[test]
    fn negative_and_oversized_values_are_rejected() {
        let negative = AddQuoteItemInput {
            quantity: dec!(-1),
            ..labor_input()
        };
        assert_matches!(
            negative.check_values(),
            Err(ServiceError::ValidationError(msg)) if msg.contains("quantity")
        );

        let huge = UpdateQuoteItemInput {
            unit_price: Some(Decimal::MAX),
            ..Default::default()
        };
        assert_matches!(
            huge.check_values(),
            Err(ServiceError::ValidationError(msg)) if msg.contains("unit_price")
        );
        assert!(UpdateQuoteItemInput::default().check_values().is_ok());
    }

    #[test]
    fn labor_cannot_carry_both_flat_price_and_rate() {
        let both = AddQuoteItemInput {
            unit_price: Some(dec!(100)),
            hourly_rate: Some(dec!(800)),
            ..labor_input()
        };
        assert_matches!(both.check_values(), Err(ServiceError::ValidationError(_)));

        let flat = AddQuoteItemInput {
            unit_price: Some(dec!(100)),
            ..labor_input()
        };
        assert!(flat.check_values().is_ok());
    }

    #[test]
    fn add_item_input_requires_reference_code() {
        let input = AddQuoteItemInput {
            item_type: ItemType::Part,
            reference_code: String::new(),
            name: None,
            quantity: dec!(1),
            unit_price: None,
            discount_pct: None,
            duration_hours: None,
            hourly_rate: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn update_input_fields_are_optional() {
        let input: UpdateQuoteItemInput = serde_json::from_str(r#"{"quantity": 3}"#).unwrap();
        assert_eq!(input.quantity, Some(dec!(3)));
        assert!(input.discount_pct.is_none());
    }
}
