use crate::{
    entities::{catalog_part, labor_operation, ItemType},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use uuid::Uuid;

/// Upper bound on bind parameters per `IN (...)` query.
const LOOKUP_BATCH: usize = 500;

/// Catalog rows keyed by their natural code, scoped to one brand.
#[derive(Debug, Clone, Default)]
pub struct CatalogLookup {
    pub parts: HashMap<String, catalog_part::Model>,
    pub labor: HashMap<String, labor_operation::Model>,
}

impl CatalogLookup {
    pub fn part(&self, part_no: &str) -> Option<&catalog_part::Model> {
        self.parts.get(part_no)
    }

    pub fn labor(&self, operation_code: &str) -> Option<&labor_operation::Model> {
        self.labor.get(operation_code)
    }

    pub fn contains(&self, item_type: ItemType, code: &str) -> bool {
        match item_type {
            ItemType::Part => self.parts.contains_key(code),
            ItemType::Labor => self.labor.contains_key(code),
        }
    }
}

/// Read-only, batched access to catalog parts and labor operations.
pub struct CatalogIndex;

impl CatalogIndex {
    /// Loads the parts of `brand_id` whose `part_no` is in `codes`.
    pub async fn find_parts<C, S>(
        conn: &C,
        brand_id: Uuid,
        codes: &[S],
    ) -> Result<HashMap<String, catalog_part::Model>, ServiceError>
    where
        C: ConnectionTrait,
        S: AsRef<str>,
    {
        let codes = distinct(codes);
        let mut found = HashMap::with_capacity(codes.len());

        for batch in codes.chunks(LOOKUP_BATCH) {
            let rows = catalog_part::Entity::find()
                .filter(catalog_part::Column::BrandId.eq(brand_id))
                .filter(catalog_part::Column::PartNo.is_in(batch.iter().cloned()))
                .all(conn)
                .await?;
            found.extend(rows.into_iter().map(|row| (row.part_no.clone(), row)));
        }

        debug!(%brand_id, requested = codes.len(), found = found.len(), "Catalog part lookup");
        Ok(found)
    }

    /// Loads the labor operations of `brand_id` whose code is in `codes`.
    pub async fn find_labor_operations<C, S>(
        conn: &C,
        brand_id: Uuid,
        codes: &[S],
    ) -> Result<HashMap<String, labor_operation::Model>, ServiceError>
    where
        C: ConnectionTrait,
        S: AsRef<str>,
    {
        let codes = distinct(codes);
        let mut found = HashMap::with_capacity(codes.len());

        for batch in codes.chunks(LOOKUP_BATCH) {
            let rows = labor_operation::Entity::find()
                .filter(labor_operation::Column::BrandId.eq(brand_id))
                .filter(labor_operation::Column::OperationCode.is_in(batch.iter().cloned()))
                .all(conn)
                .await?;
            found.extend(rows.into_iter().map(|row| (row.operation_code.clone(), row)));
        }

        debug!(%brand_id, requested = codes.len(), found = found.len(), "Catalog labor lookup");
        Ok(found)
    }

    /// Resolves a set of `(item_type, code)` pairs with one query per type.
    pub async fn lookup<'a, C, I>(
        conn: &C,
        brand_id: Uuid,
        pairs: I,
    ) -> Result<CatalogLookup, ServiceError>
    where
        C: ConnectionTrait,
        I: IntoIterator<Item = (ItemType, &'a str)>,
    {
        let mut part_codes = Vec::new();
        let mut labor_codes = Vec::new();
        for (item_type, code) in pairs {
            match item_type {
                ItemType::Part => part_codes.push(code),
                ItemType::Labor => labor_codes.push(code),
            }
        }

        Ok(CatalogLookup {
            parts: Self::find_parts(conn, brand_id, &part_codes).await?,
            labor: Self::find_labor_operations(conn, brand_id, &labor_codes).await?,
        })
    }
}

fn distinct<S: AsRef<str>>(codes: &[S]) -> Vec<String> {
    codes
        .iter()
        .map(|c| c.as_ref().trim())
        .filter(|c| !c.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}
