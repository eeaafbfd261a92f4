use crate::{
    config::AppConfig,
    entities::app_setting,
    errors::ServiceError,
    services::{bulk_discount::DiscountPreset, pricing::HUNDRED},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{sea_query::OnConflict, ActiveValue::Set, DatabaseConnection, EntityTrait};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Well-known setting keys
pub mod keys {
    use crate::services::bulk_discount::DiscountPreset;

    pub const DEFAULT_TAX_RATE: &str = "quote.default_tax_rate";

    pub fn preset_parts_pct(preset: DiscountPreset) -> String {
        format!("discount.{}.parts_pct", preset)
    }

    pub fn preset_labor_pct(preset: DiscountPreset) -> String {
        format!("discount.{}.labor_pct", preset)
    }
}

/// Key/value settings backed by `app_settings`, falling back to [`AppConfig`].
#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
}

impl SettingsStore {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        Ok(app_setting::Entity::find_by_id(key.to_string())
            .one(&*self.db)
            .await?
            .map(|row| row.value))
    }

    /// Inserts or replaces a setting.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        let row = app_setting::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(Utc::now()),
        };

        app_setting::Entity::insert(row)
            .on_conflict(
                OnConflict::column(app_setting::Column::Key)
                    .update_columns([app_setting::Column::Value, app_setting::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        Ok(())
    }

    /// Reads a percentage setting. Unparsable or out-of-range values are
    /// logged and treated as absent.
    pub async fn get_pct(&self, key: &str) -> Result<Option<Decimal>, ServiceError> {
        Ok(self.get(key).await?.and_then(|raw| parse_pct(key, &raw)))
    }

    /// Tax rate for new quotes, in percent.
    pub async fn default_tax_rate(&self) -> Result<Decimal, ServiceError> {
        Ok(self
            .get_pct(keys::DEFAULT_TAX_RATE)
            .await?
            .unwrap_or_else(|| self.config.default_tax_rate_pct()))
    }

    /// `(parts_pct, labor_pct)` for a discount preset.
    pub async fn preset_percentages(
        &self,
        preset: DiscountPreset,
    ) -> Result<(Decimal, Decimal), ServiceError> {
        let (parts_default, labor_default) = self.config.preset_percentages(preset);
        let parts = self
            .get_pct(&keys::preset_parts_pct(preset))
            .await?
            .unwrap_or(parts_default);
        let labor = self
            .get_pct(&keys::preset_labor_pct(preset))
            .await?
            .unwrap_or(labor_default);
        Ok((parts, labor))
    }
}

fn parse_pct(key: &str, raw: &str) -> Option<Decimal> {
    match Decimal::from_str(raw.trim()) {
        Ok(value) if value >= Decimal::ZERO && value <= HUNDRED => Some(value),
        Ok(value) => {
            warn!(key, %value, "Ignoring out-of-range percentage setting");
            None
        }
        Err(e) => {
            warn!(key, raw, error = %e, "Ignoring unparsable percentage setting");
            None
        }
    }
}
