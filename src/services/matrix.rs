use crate::{
    entities::{maintenance_template, template_item, ItemType},
    errors::ServiceError,
    services::{
        catalog_index::{CatalogIndex, CatalogLookup},
        pricing,
        template_resolver::resolve_item,
    },
};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// One column of the matrix: every template sharing a service period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixPeriod {
    pub period_km: Option<i32>,
    pub period_month: Option<i32>,
    pub label: String,
    pub template_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixCell {
    pub included: bool,
    pub quantity: Decimal,
    pub amount: Decimal,
}

impl MatrixCell {
    fn empty() -> Self {
        Self {
            included: false,
            quantity: Decimal::ZERO,
            amount: Decimal::ZERO,
        }
    }
}

/// One resolved catalog item with a cell per period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixRow {
    pub item_type: ItemType,
    pub reference_code: String,
    pub name: String,
    /// Catalog list price, before any template override
    pub list_price: Decimal,
    pub cells: Vec<MatrixCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodTotals {
    pub parts_total: Decimal,
    pub labor_total: Decimal,
    pub total: Decimal,
}

/// A referenced code with no catalog entry, and the templates that use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixGap {
    pub item_type: ItemType,
    pub reference_code: String,
    pub template_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceMatrix {
    pub brand_id: Uuid,
    pub model_id: Option<Uuid>,
    pub periods: Vec<MatrixPeriod>,
    pub rows: Vec<MatrixRow>,
    pub period_totals: Vec<PeriodTotals>,
    pub gaps: Vec<MatrixGap>,
}

type PeriodKey = (Option<i32>, Option<i32>);

/// Zero-km first, then ascending km, then templates without km by month.
fn compare_periods(a: &PeriodKey, b: &PeriodKey) -> Ordering {
    fn bucket(km: Option<i32>) -> u8 {
        match km {
            Some(0) => 0,
            Some(_) => 1,
            None => 2,
        }
    }

    bucket(a.0)
        .cmp(&bucket(b.0))
        .then_with(|| a.0.cmp(&b.0))
        .then_with(|| match (a.1, b.1) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

fn period_label(km: Option<i32>, month: Option<i32>) -> String {
    match (km, month) {
        (Some(km), Some(month)) => format!("{} km / {} mo", km, month),
        (Some(km), None) => format!("{} km", km),
        (None, Some(month)) => format!("{} mo", month),
        (None, None) => "unscheduled".to_string(),
    }
}

/// Builds the matrix from templates already loaded with their items.
///
/// Labor cells are priced with each template's own duration override, so the
/// same operation can carry different amounts in different periods.
pub fn assemble_matrix(
    brand_id: Uuid,
    model_id: Option<Uuid>,
    templates: &[(maintenance_template::Model, Vec<template_item::Model>)],
    lookup: &CatalogLookup,
) -> MaintenanceMatrix {
    let mut keys: Vec<PeriodKey> = templates
        .iter()
        .map(|(t, _)| (t.period_km, t.period_month))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    keys.sort_by(compare_periods);
    let column: HashMap<PeriodKey, usize> =
        keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();

    let mut periods: Vec<MatrixPeriod> = keys
        .iter()
        .map(|(km, month)| MatrixPeriod {
            period_km: *km,
            period_month: *month,
            label: period_label(*km, *month),
            template_ids: Vec::new(),
        })
        .collect();

    // Rows keyed by (type, code): parts sort before labor, then by code.
    let mut rows: BTreeMap<(ItemType, String), Vec<MatrixCell>> = BTreeMap::new();
    let mut gaps: BTreeMap<(ItemType, String), BTreeSet<Uuid>> = BTreeMap::new();

    for (template, items) in templates {
        let col = column[&(template.period_km, template.period_month)];
        periods[col].template_ids.push(template.id);

        for item in items {
            let key = (item.item_type, item.reference_code.clone());
            match resolve_item(item, lookup) {
                Some(line) => {
                    let cells = rows
                        .entry(key)
                        .or_insert_with(|| vec![MatrixCell::empty(); keys.len()]);
                    let cell = &mut cells[col];
                    cell.included = true;
                    cell.quantity += line.quantity;
                    cell.amount += line.total_price;
                }
                None => {
                    gaps.entry(key).or_default().insert(template.id);
                }
            }
        }
    }

    let mut period_totals = vec![PeriodTotals::default(); keys.len()];
    let rows: Vec<MatrixRow> = rows
        .into_iter()
        .map(|((item_type, code), cells)| {
            for (totals, cell) in period_totals.iter_mut().zip(&cells) {
                if !cell.included {
                    continue;
                }
                match item_type {
                    ItemType::Part => totals.parts_total += cell.amount,
                    ItemType::Labor => totals.labor_total += cell.amount,
                }
                totals.total += cell.amount;
            }

            let (name, list_price) = match item_type {
                ItemType::Part => lookup
                    .part(&code)
                    .map(|p| (p.name.clone(), p.unit_price))
                    .unwrap_or_default(),
                ItemType::Labor => lookup
                    .labor(&code)
                    .map(|l| (l.name.clone(), pricing::labor_list_price(l)))
                    .unwrap_or_default(),
            };

            MatrixRow {
                item_type,
                reference_code: code,
                name,
                list_price,
                cells,
            }
        })
        .collect();

    let gaps = gaps
        .into_iter()
        .map(|((item_type, reference_code), ids)| MatrixGap {
            item_type,
            reference_code,
            template_ids: ids.into_iter().collect(),
        })
        .collect();

    MaintenanceMatrix {
        brand_id,
        model_id,
        periods,
        rows,
        period_totals,
        gaps,
    }
}

/// Loads every template in scope and builds the matrix with two catalog queries.
pub async fn build_matrix<C: ConnectionTrait>(
    conn: &C,
    brand_id: Uuid,
    model_id: Option<Uuid>,
) -> Result<MaintenanceMatrix, ServiceError> {
    let mut query = maintenance_template::Entity::find()
        .filter(maintenance_template::Column::BrandId.eq(brand_id));
    if let Some(model_id) = model_id {
        query = query.filter(maintenance_template::Column::ModelId.eq(model_id));
    }
    let templates = query
        .order_by_asc(maintenance_template::Column::CreatedAt)
        .all(conn)
        .await?;

    let template_ids: Vec<Uuid> = templates.iter().map(|t| t.id).collect();
    let mut items_by_template: HashMap<Uuid, Vec<template_item::Model>> = HashMap::new();
    for batch in template_ids.chunks(500) {
        let items = template_item::Entity::find()
            .filter(template_item::Column::TemplateId.is_in(batch.iter().copied()))
            .order_by_asc(template_item::Column::SortOrder)
            .all(conn)
            .await?;
        for item in items {
            items_by_template.entry(item.template_id).or_default().push(item);
        }
    }

    let lookup = CatalogIndex::lookup(
        conn,
        brand_id,
        items_by_template
            .values()
            .flatten()
            .map(|item| (item.item_type, item.reference_code.as_str())),
    )
    .await?;

    let loaded: Vec<(maintenance_template::Model, Vec<template_item::Model>)> = templates
        .into_iter()
        .map(|t| {
            let items = items_by_template.remove(&t.id).unwrap_or_default();
            (t, items)
        })
        .collect();

    let matrix = assemble_matrix(brand_id, model_id, &loaded, &lookup);

    for gap in &matrix.gaps {
        warn!(
            %brand_id,
            item_type = %gap.item_type,
            reference_code = %gap.reference_code,
            templates = gap.template_ids.len(),
            "Matrix reference does not resolve to a catalog entry"
        );
    }

    Ok(matrix)
}

/// Read-only matrix report service
#[derive(Clone)]
pub struct MatrixBuilder {
    db: Arc<DatabaseConnection>,
}

impl MatrixBuilder {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn build(
        &self,
        brand_id: Uuid,
        model_id: Option<Uuid>,
    ) -> Result<MaintenanceMatrix, ServiceError> {
        let matrix = build_matrix(&*self.db, brand_id, model_id).await?;
        info!(
            "Built maintenance matrix for brand {}: {} periods, {} rows, {} gaps",
            brand_id,
            matrix.periods.len(),
            matrix.rows.len(),
            matrix.gaps.len()
        );
        Ok(matrix)
    }
}
