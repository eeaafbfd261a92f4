use crate::{
    entities::{maintenance_template, template_item, ItemType},
    errors::ServiceError,
    services::{
        catalog_index::{CatalogIndex, CatalogLookup},
        pricing,
    },
};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// A template item priced against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLineItem {
    pub item_type: ItemType,
    pub reference_code: String,
    pub name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub duration_hours: Option<Decimal>,
    pub hourly_rate: Option<Decimal>,
    pub total_price: Decimal,
    pub sort_order: i32,
}

/// A template item whose code has no catalog entry for the brand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ReferenceGap {
    pub item_type: ItemType,
    pub reference_code: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedTemplate {
    pub template: maintenance_template::Model,
    pub items: Vec<ResolvedLineItem>,
    pub gaps: Vec<ReferenceGap>,
}

/// Prices one template item, or `None` when its code does not resolve.
pub fn resolve_item(item: &template_item::Model, lookup: &CatalogLookup) -> Option<ResolvedLineItem> {
    match item.item_type {
        ItemType::Part => lookup.part(&item.reference_code).map(|part| ResolvedLineItem {
            item_type: ItemType::Part,
            reference_code: item.reference_code.clone(),
            name: part.name.clone(),
            quantity: item.quantity,
            unit_price: part.unit_price,
            duration_hours: None,
            hourly_rate: None,
            total_price: item.quantity * part.unit_price,
            sort_order: item.sort_order,
        }),
        ItemType::Labor => lookup.labor(&item.reference_code).map(|labor| {
            let snap = pricing::labor_snapshot(labor, item.duration_override);
            ResolvedLineItem {
                item_type: ItemType::Labor,
                reference_code: item.reference_code.clone(),
                name: labor.name.clone(),
                quantity: item.quantity,
                unit_price: snap.unit_price,
                duration_hours: Some(snap.duration_hours),
                hourly_rate: snap.hourly_rate,
                total_price: pricing::gross(
                    ItemType::Labor,
                    item.quantity,
                    snap.unit_price,
                    Some(snap.duration_hours),
                    snap.hourly_rate,
                ),
                sort_order: item.sort_order,
            }
        }),
    }
}

/// Splits template items into resolved lines and reference gaps, keeping
/// the input order.
pub fn resolve_items(
    items: &[template_item::Model],
    lookup: &CatalogLookup,
) -> (Vec<ResolvedLineItem>, Vec<ReferenceGap>) {
    let mut resolved = Vec::with_capacity(items.len());
    let mut gaps = Vec::new();

    for item in items {
        match resolve_item(item, lookup) {
            Some(line) => resolved.push(line),
            None => gaps.push(ReferenceGap {
                item_type: item.item_type,
                reference_code: item.reference_code.clone(),
                sort_order: item.sort_order,
            }),
        }
    }

    (resolved, gaps)
}

/// Loads a template of `brand_id` and resolves its items against the catalog.
pub async fn resolve_template<C: ConnectionTrait>(
    conn: &C,
    template_id: Uuid,
    brand_id: Uuid,
) -> Result<ResolvedTemplate, ServiceError> {
    let template = maintenance_template::Entity::find_by_id(template_id)
        .filter(maintenance_template::Column::BrandId.eq(brand_id))
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Template {} not found for brand {}",
                template_id, brand_id
            ))
        })?;

    let items = template_item::Entity::find()
        .filter(template_item::Column::TemplateId.eq(template_id))
        .order_by_asc(template_item::Column::SortOrder)
        .all(conn)
        .await?;

    let lookup = CatalogIndex::lookup(
        conn,
        brand_id,
        items
            .iter()
            .map(|item| (item.item_type, item.reference_code.as_str())),
    )
    .await?;

    let (items, gaps) = resolve_items(&items, &lookup);

    for gap in &gaps {
        warn!(
            %template_id,
            %brand_id,
            item_type = %gap.item_type,
            reference_code = %gap.reference_code,
            sort_order = gap.sort_order,
            "Template item does not resolve to a catalog entry"
        );
    }

    Ok(ResolvedTemplate {
        template,
        items,
        gaps,
    })
}

/// Service wrapper used by the HTTP and CLI surfaces.
#[derive(Clone)]
pub struct TemplateResolver {
    db: Arc<DatabaseConnection>,
}

impl TemplateResolver {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        template_id: Uuid,
        brand_id: Uuid,
    ) -> Result<ResolvedTemplate, ServiceError> {
        resolve_template(&*self.db, template_id, brand_id).await
    }
}
