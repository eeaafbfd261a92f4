use crate::{
    db::record_transaction,
    entities::{quote_item, DiscountSource, ItemType},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        aggregator::{load_items, recalculate_quote_totals, QuoteDetails},
        pricing::{clamp_pct, price_item},
        quote_locks::QuoteLockRegistry,
        quotes::{ensure_draft, find_quote},
        settings::SettingsStore,
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tracing::{info, instrument};
use uuid::Uuid;

/// Named bulk discount configurations.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountPreset {
    Loyalty,
    WarrantyLapsed,
}

/// Uniform `(parts_pct, labor_pct)` request
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct UniformDiscountInput {
    pub parts_pct: Decimal,
    pub labor_pct: Decimal,
}

/// Overwrites per-line discounts across every part or labor line at once.
#[derive(Clone)]
pub struct BulkDiscountService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    locks: QuoteLockRegistry,
    settings: SettingsStore,
}

impl BulkDiscountService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        locks: QuoteLockRegistry,
        settings: SettingsStore,
    ) -> Self {
        Self {
            db,
            event_sender,
            locks,
            settings,
        }
    }

    /// Sets every part line to `parts_pct` and every labor line to
    /// `labor_pct`, replacing earlier per-line discounts.
    #[instrument(skip(self))]
    pub async fn apply_uniform_discount(
        &self,
        quote_id: Uuid,
        parts_pct: Decimal,
        labor_pct: Decimal,
    ) -> Result<QuoteDetails, ServiceError> {
        let details = self
            .apply(quote_id, parts_pct, labor_pct, None)
            .await?;

        self.event_sender
            .send_or_log(Event::QuoteDiscountApplied {
                quote_id,
                kind: "uniform".to_string(),
            })
            .await;

        Ok(details)
    }

    /// Applies a named preset; its percentages come from settings.
    #[instrument(skip(self))]
    pub async fn apply_preset(
        &self,
        quote_id: Uuid,
        preset: DiscountPreset,
    ) -> Result<QuoteDetails, ServiceError> {
        let (parts_pct, labor_pct) = self.settings.preset_percentages(preset).await?;
        let details = self
            .apply(quote_id, parts_pct, labor_pct, Some(preset))
            .await?;

        counter!("pricing.preset.applied", 1, "preset" => preset.to_string());
        self.event_sender
            .send_or_log(Event::QuoteDiscountApplied {
                quote_id,
                kind: preset.to_string(),
            })
            .await;

        Ok(details)
    }

    async fn apply(
        &self,
        quote_id: Uuid,
        parts_pct: Decimal,
        labor_pct: Decimal,
        preset: Option<DiscountPreset>,
    ) -> Result<QuoteDetails, ServiceError> {
        let parts_pct = clamp_pct(parts_pct);
        let labor_pct = clamp_pct(labor_pct);

        let _guard = self.locks.lock(quote_id).await;
        let started = Instant::now();
        let txn = self.db.begin().await?;

        let mut quote = find_quote(&txn, quote_id).await?;
        ensure_draft(&quote)?;

        let (source, preset_name) = match preset {
            Some(p) => (DiscountSource::Preset, Some(p.to_string())),
            None => (DiscountSource::Manual, None),
        };

        let items = load_items(&txn, quote_id).await?;
        let now = Utc::now();
        let touched = items.len();
        for item in items {
            let pct = match item.item_type {
                ItemType::Part => parts_pct,
                ItemType::Labor => labor_pct,
            };
            let line = price_item(&item, pct);

            let mut active: quote_item::ActiveModel = item.into();
            active.discount_pct = Set(line.discount_pct);
            active.discount_amount = Set(line.discount_amount);
            active.total_price = Set(line.total_price);
            active.discount_source = Set(source);
            active.discount_preset = Set(preset_name.clone());
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        quote.applied_preset = preset_name;
        let details = recalculate_quote_totals(&txn, quote).await?;
        txn.commit().await?;
        record_transaction("bulk_discount", started, true);

        info!(
            "Applied {} discount to {} lines of quote {}: parts {}%, labor {}%",
            preset.map(|p| p.to_string()).unwrap_or_else(|| "uniform".into()),
            touched,
            quote_id,
            parts_pct,
            labor_pct
        );
        Ok(details)
    }
}
