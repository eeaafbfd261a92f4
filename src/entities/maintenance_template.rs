use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maintenance template: a reusable bill of materials for a vehicle scope and
/// service period.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "maintenance_templates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub brand_id: Uuid,
    #[sea_orm(nullable)]
    pub model_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub sub_model_id: Option<Uuid>,
    pub name: String,
    #[sea_orm(nullable)]
    pub period_km: Option<i32>,
    #[sea_orm(nullable)]
    pub period_month: Option<i32>,
    pub service_type: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::template_item::Entity")]
    TemplateItems,
}

impl Related<super::template_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TemplateItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
