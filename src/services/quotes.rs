use crate::{
    db::record_transaction,
    entities::{quote, DiscountType, QuoteStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        aggregator::{load_items, recalculate_quote_totals, QuoteDetails},
        pricing::HUNDRED,
        quote_locks::QuoteLockRegistry,
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tracing::{info, instrument};
use uuid::Uuid;

/// Quote-level discount request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetQuoteDiscountInput {
    pub discount_type: DiscountType,
    #[serde(default)]
    pub discount_value: Decimal,
}

/// Loads a quote or fails with NotFound.
pub(crate) async fn find_quote<C: ConnectionTrait>(
    conn: &C,
    quote_id: Uuid,
) -> Result<quote::Model, ServiceError> {
    quote::Entity::find_by_id(quote_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Quote {} not found", quote_id)))
}

/// Rejects mutations of quotes that have left DRAFT.
pub(crate) fn ensure_draft(quote: &quote::Model) -> Result<(), ServiceError> {
    if quote.is_draft() {
        Ok(())
    } else {
        Err(ServiceError::InvalidStatus(format!(
            "Quote {} is {} and can no longer be modified",
            quote.quote_no, quote.status
        )))
    }
}

pub(crate) async fn load_details<C: ConnectionTrait>(
    conn: &C,
    quote_id: Uuid,
) -> Result<QuoteDetails, ServiceError> {
    let quote = find_quote(conn, quote_id).await?;
    let items = load_items(conn, quote_id).await?;
    Ok(QuoteDetails { quote, items })
}

/// Validates a quote-level discount against the current subtotal.
pub fn validate_quote_discount(
    discount_type: DiscountType,
    discount_value: Decimal,
    subtotal: Decimal,
) -> Result<Decimal, ServiceError> {
    if discount_value < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "discount_value must not be negative".to_string(),
        ));
    }
    match discount_type {
        DiscountType::None => Ok(Decimal::ZERO),
        DiscountType::Percent if discount_value > HUNDRED => Err(ServiceError::ValidationError(
            "percent discount must be between 0 and 100".to_string(),
        )),
        DiscountType::Amount if discount_value > subtotal => {
            Err(ServiceError::ValidationError(format!(
                "amount discount {} exceeds quote subtotal {}",
                discount_value, subtotal
            )))
        }
        _ => Ok(discount_value),
    }
}

/// Quote reads and header-level lifecycle operations.
#[derive(Clone)]
pub struct QuoteService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    locks: QuoteLockRegistry,
}

impl QuoteService {
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

    #[instrument(skip(self))]
    pub async fn get_quote(&self, quote_id: Uuid) -> Result<QuoteDetails, ServiceError> {
        load_details(&*self.db, quote_id).await
    }

    /// Sets the quote-level discount and recomputes totals.
    #[instrument(skip(self, input))]
    pub async fn set_quote_discount(
        &self,
        quote_id: Uuid,
        input: SetQuoteDiscountInput,
    ) -> Result<QuoteDetails, ServiceError> {
        let _guard = self.locks.lock(quote_id).await;
        let started = Instant::now();
        let txn = self.db.begin().await?;

        let mut quote = find_quote(&txn, quote_id).await?;
        ensure_draft(&quote)?;

        let value = validate_quote_discount(input.discount_type, input.discount_value, quote.subtotal)?;
        quote.discount_type = input.discount_type;
        quote.discount_value = value;

        let details = recalculate_quote_totals(&txn, quote).await?;
        txn.commit().await?;
        record_transaction("set_quote_discount", started, true);

        self.event_sender
            .send_or_log(Event::QuoteDiscountApplied {
                quote_id,
                kind: "quote".to_string(),
            })
            .await;

        info!(
            "Set {} discount {} on quote {}: discount amount {}",
            input.discount_type, value, quote_id, details.quote.discount_amount
        );
        Ok(details)
    }

    /// Sets the tax rate (percent) and recomputes totals.
    #[instrument(skip(self))]
    pub async fn set_tax_rate(
        &self,
        quote_id: Uuid,
        tax_rate: Decimal,
    ) -> Result<QuoteDetails, ServiceError> {
        if tax_rate < Decimal::ZERO || tax_rate > HUNDRED {
            return Err(ServiceError::ValidationError(
                "tax_rate must be between 0 and 100".to_string(),
            ));
        }

        let _guard = self.locks.lock(quote_id).await;
        let started = Instant::now();
        let txn = self.db.begin().await?;

        let mut quote = find_quote(&txn, quote_id).await?;
        ensure_draft(&quote)?;
        quote.tax_rate = tax_rate;

        let details = recalculate_quote_totals(&txn, quote).await?;
        txn.commit().await?;
        record_transaction("set_tax_rate", started, true);

        self.event_sender
            .send_or_log(Event::QuoteTaxRateChanged { quote_id, tax_rate })
            .await;

        info!("Set tax rate {}% on quote {}", tax_rate, quote_id);
        Ok(details)
    }

    /// Moves a DRAFT quote to FINALIZED with freshly computed totals.
    #[instrument(skip(self))]
    pub async fn finalize(&self, quote_id: Uuid) -> Result<QuoteDetails, ServiceError> {
        let details = self
            .transition(quote_id, QuoteStatus::Finalized, "finalize_quote")
            .await?;

        counter!("pricing.quote.finalized", 1);
        self.event_sender
            .send_or_log(Event::QuoteFinalized {
                quote_id,
                grand_total: details.quote.grand_total,
                at: details.quote.finalized_at.unwrap_or_else(Utc::now),
            })
            .await;

        info!(
            "Finalized quote {} with grand total {}",
            details.quote.quote_no, details.quote.grand_total
        );
        Ok(details)
    }

    /// Moves a DRAFT quote to CANCELLED.
    #[instrument(skip(self))]
    pub async fn cancel(&self, quote_id: Uuid) -> Result<QuoteDetails, ServiceError> {
        let details = self
            .transition(quote_id, QuoteStatus::Cancelled, "cancel_quote")
            .await?;

        counter!("pricing.quote.cancelled", 1);
        self.event_sender
            .send_or_log(Event::QuoteCancelled {
                quote_id,
                at: details.quote.cancelled_at.unwrap_or_else(Utc::now),
            })
            .await;

        info!("Cancelled quote {}", details.quote.quote_no);
        Ok(details)
    }

    async fn transition(
        &self,
        quote_id: Uuid,
        target: QuoteStatus,
        operation: &'static str,
    ) -> Result<QuoteDetails, ServiceError> {
        let _guard = self.locks.lock(quote_id).await;
        let started = Instant::now();
        let txn = self.db.begin().await?;

        let mut quote = find_quote(&txn, quote_id).await?;
        ensure_draft(&quote)?;

        let now = Utc::now();
        quote.status = target;
        match target {
            QuoteStatus::Finalized => quote.finalized_at = Some(now),
            QuoteStatus::Cancelled => quote.cancelled_at = Some(now),
            QuoteStatus::Draft => {
                return Err(ServiceError::InvalidStatus(
                    "quotes cannot return to DRAFT".to_string(),
                ))
            }
        }

        let details = recalculate_quote_totals(&txn, quote).await?;
        txn.commit().await?;
        record_transaction(operation, started, true);

        Ok(details)
    }
}
