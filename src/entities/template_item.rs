use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One ordered line of a maintenance template. `reference_code` points into
/// the catalog by code and may dangle.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "template_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub template_id: Uuid,
    pub item_type: ItemType,
    pub reference_code: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub duration_override: Option<Decimal>,
    pub sort_order: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::maintenance_template::Entity",
        from = "Column::TemplateId",
        to = "super::maintenance_template::Column::Id"
    )]
    MaintenanceTemplate,
}

impl Related<super::maintenance_template::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MaintenanceTemplate.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Line item kind, shared by template and quote items.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ItemType {
    #[sea_orm(string_value = "PART")]
    Part,
    #[sea_orm(string_value = "LABOR")]
    Labor,
}
