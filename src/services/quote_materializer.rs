use crate::{
    db::record_transaction,
    entities::{quote, quote_item, DiscountSource, DiscountType, QuoteStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        aggregator::QuoteTotals,
        quote_number::QuoteNumberGenerator,
        settings::SettingsStore,
        template_resolver::{resolve_template, ReferenceGap, ResolvedLineItem},
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Header fields for a quote being materialized.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MaterializeQuoteInput {
    pub brand_id: Uuid,
    pub template_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub brand_name: String,
    #[validate(length(max = 255))]
    pub model_name: Option<String>,
    #[validate(length(max = 255))]
    pub sub_model_name: Option<String>,
    #[validate(length(max = 255))]
    pub customer_name: Option<String>,
}

/// Input for creating a quote from a maintenance template.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateQuoteInput {
    pub template_id: Uuid,
    pub brand_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub brand_name: String,
    #[validate(length(max = 255))]
    pub model_name: Option<String>,
    #[validate(length(max = 255))]
    pub sub_model_name: Option<String>,
    #[validate(length(max = 255))]
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterializedQuote {
    pub quote: quote::Model,
    pub items: Vec<quote_item::Model>,
    pub gaps: Vec<ReferenceGap>,
}

/// Turns resolved template lines into a persisted DRAFT quote.
#[derive(Clone)]
pub struct QuoteMaterializer {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    settings: SettingsStore,
    numbers: Arc<dyn QuoteNumberGenerator>,
}

impl QuoteMaterializer {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        settings: SettingsStore,
        numbers: Arc<dyn QuoteNumberGenerator>,
    ) -> Self {
        Self {
            db,
            event_sender,
            settings,
            numbers,
        }
    }

    /// Resolves `input.template_id` for the brand and materializes the result.
    #[instrument(skip(self, input), fields(template_id = %input.template_id))]
    pub async fn create_quote_from_template(
        &self,
        input: CreateQuoteInput,
    ) -> Result<MaterializedQuote, ServiceError> {
        input.validate()?;

        let resolved = resolve_template(&*self.db, input.template_id, input.brand_id).await?;

        self.materialize(
            &resolved.items,
            resolved.gaps,
            MaterializeQuoteInput {
                brand_id: input.brand_id,
                template_id: Some(input.template_id),
                brand_name: input.brand_name,
                model_name: input.model_name,
                sub_model_name: input.sub_model_name,
                customer_name: input.customer_name,
            },
        )
        .await
    }

    /// Inserts the quote header and one item per resolved line in a single
    /// transaction.
    #[instrument(skip(self, lines, gaps, input), fields(lines = lines.len()))]
    pub async fn materialize(
        &self,
        lines: &[ResolvedLineItem],
        gaps: Vec<ReferenceGap>,
        input: MaterializeQuoteInput,
    ) -> Result<MaterializedQuote, ServiceError> {
        input.validate()?;

        let tax_rate = self.settings.default_tax_rate().await?;
        let totals = QuoteTotals::compute(
            lines.iter().map(|line| (line.item_type, line.total_price)),
            DiscountType::None,
            Decimal::ZERO,
            tax_rate,
        );

        let now = Utc::now();
        let quote_id = Uuid::new_v4();
        let quote_no = self.numbers.next_quote_no();

        let header = quote::ActiveModel {
            id: Set(quote_id),
            quote_no: Set(quote_no.clone()),
            brand_id: Set(input.brand_id),
            template_id: Set(input.template_id),
            brand_name: Set(input.brand_name),
            model_name: Set(input.model_name),
            sub_model_name: Set(input.sub_model_name),
            customer_name: Set(input.customer_name),
            status: Set(QuoteStatus::Draft),
            parts_subtotal: Set(totals.parts_subtotal),
            labor_subtotal: Set(totals.labor_subtotal),
            subtotal: Set(totals.subtotal),
            discount_type: Set(DiscountType::None),
            discount_value: Set(Decimal::ZERO),
            discount_amount: Set(totals.discount_amount),
            tax_rate: Set(tax_rate),
            tax_amount: Set(totals.tax_amount),
            grand_total: Set(totals.grand_total),
            applied_preset: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            finalized_at: Set(None),
            cancelled_at: Set(None),
        };

        let items: Vec<quote_item::ActiveModel> = lines
            .iter()
            .map(|line| quote_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                quote_id: Set(quote_id),
                item_type: Set(line.item_type),
                reference_code: Set(line.reference_code.clone()),
                name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                discount_pct: Set(Decimal::ZERO),
                discount_amount: Set(Decimal::ZERO),
                total_price: Set(line.total_price),
                duration_hours: Set(line.duration_hours),
                hourly_rate: Set(line.hourly_rate),
                sort_order: Set(line.sort_order),
                discount_source: Set(DiscountSource::None),
                discount_preset: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .collect();

        let started = Instant::now();
        let txn = self.db.begin().await?;

        let inserted = async {
            quote::Entity::insert(header).exec(&txn).await?;
            if !items.is_empty() {
                quote_item::Entity::insert_many(items).exec(&txn).await?;
            }
            Ok::<_, ServiceError>(())
        }
        .await;

        if let Err(e) = inserted {
            txn.rollback().await?;
            record_transaction("materialize_quote", started, false);
            return Err(e);
        }

        let details = crate::services::quotes::load_details(&txn, quote_id).await?;
        txn.commit().await?;
        record_transaction("materialize_quote", started, true);
        counter!("pricing.quote.created", 1);

        self.event_sender
            .send_or_log(Event::QuoteCreated {
                quote_id,
                quote_no: quote_no.clone(),
                template_id: details.quote.template_id,
                grand_total: details.quote.grand_total,
                gap_count: gaps.len(),
            })
            .await;

        info!(
            "Created quote {} ({}) with {} items, {} gaps, grand total {}",
            quote_no,
            quote_id,
            details.items.len(),
            gaps.len(),
            details.quote.grand_total
        );

        Ok(MaterializedQuote {
            quote: details.quote,
            items: details.items,
            gaps,
        })
    }
}
