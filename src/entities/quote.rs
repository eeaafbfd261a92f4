use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priced maintenance quote header
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quotes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub quote_no: String,
    pub brand_id: Uuid,
    #[sea_orm(nullable)]
    pub template_id: Option<Uuid>,
    pub brand_name: String,
    #[sea_orm(nullable)]
    pub model_name: Option<String>,
    #[sea_orm(nullable)]
    pub sub_model_name: Option<String>,
    #[sea_orm(nullable)]
    pub customer_name: Option<String>,
    pub status: QuoteStatus,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub parts_subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub labor_subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    pub discount_type: DiscountType,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_amount: Decimal,
    /// Percentage, 20 means 20%
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub grand_total: Decimal,
    #[sea_orm(nullable)]
    pub applied_preset: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub finalized_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::quote_item::Entity")]
    QuoteItems,
}

impl Related<super::quote_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QuoteItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_draft(&self) -> bool {
        self.status == QuoteStatus::Draft
    }
}

/// Quote lifecycle status. Transitions only leave DRAFT, never return to it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    #[sea_orm(string_value = "DRAFT")]
    Draft,
    #[sea_orm(string_value = "FINALIZED")]
    Finalized,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

/// Quote-level discount kind
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum DiscountType {
    #[sea_orm(string_value = "NONE")]
    None,
    #[sea_orm(string_value = "PERCENT")]
    Percent,
    #[sea_orm(string_value = "AMOUNT")]
    Amount,
}
