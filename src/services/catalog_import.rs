use crate::{
    config::AppConfig,
    db::record_transaction,
    entities::{catalog_part, labor_operation},
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::{check_range, MAX_QUANTITY, MAX_UNIT_AMOUNT},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ActiveValue::Set, DatabaseConnection, EntityTrait, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc, time::Instant};
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CatalogPartRecord {
    #[validate(length(min = 1, max = 64))]
    pub part_no: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub unit_price: Decimal,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LaborOperationRecord {
    #[validate(length(min = 1, max = 64))]
    pub operation_code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub duration_hours: Decimal,
    pub hourly_rate: Decimal,
    #[serde(default)]
    pub total_price: Option<Decimal>,
}

/// Catalog rows for one brand, as read from a JSON document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogImportBatch {
    pub brand_id: Uuid,
    #[serde(default)]
    pub parts: Vec<CatalogPartRecord>,
    #[serde(default)]
    pub labor_operations: Vec<LaborOperationRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogImportSummary {
    pub parts_written: usize,
    pub labor_operations_written: usize,
    pub chunks: usize,
}

impl CatalogImportBatch {
    /// Validates every record before anything is written.
    pub fn validate_records(&self) -> Result<(), ServiceError> {
        for part in &self.parts {
            part.validate()?;
            check_range("unit_price", Some(part.unit_price), MAX_UNIT_AMOUNT)
                .map_err(|e| in_record(&part.part_no, e))?;
        }
        for op in &self.labor_operations {
            op.validate()?;
            check_range("duration_hours", Some(op.duration_hours), MAX_QUANTITY)
                .and_then(|_| check_range("hourly_rate", Some(op.hourly_rate), MAX_UNIT_AMOUNT))
                .and_then(|_| check_range("total_price", op.total_price, MAX_UNIT_AMOUNT))
                .map_err(|e| in_record(&op.operation_code, e))?;
        }
        Ok(())
    }

    /// Drops earlier duplicates of the same natural key; the last record wins.
    fn deduplicated(self) -> (Vec<CatalogPartRecord>, Vec<LaborOperationRecord>) {
        let parts: BTreeMap<String, CatalogPartRecord> = self
            .parts
            .into_iter()
            .map(|p| (p.part_no.trim().to_string(), p))
            .collect();
        let labor: BTreeMap<String, LaborOperationRecord> = self
            .labor_operations
            .into_iter()
            .map(|l| (l.operation_code.trim().to_string(), l))
            .collect();

        (
            parts
                .into_iter()
                .map(|(code, mut p)| {
                    p.part_no = code;
                    p
                })
                .collect(),
            labor
                .into_iter()
                .map(|(code, mut l)| {
                    l.operation_code = code;
                    l
                })
                .collect(),
        )
    }
}

fn in_record(code: &str, err: ServiceError) -> ServiceError {
    match err {
        ServiceError::ValidationError(msg) => {
            ServiceError::ValidationError(format!("{}: {}", code.trim(), msg))
        }
        other => other,
    }
}

/// Chunked upsert of catalog rows by `(brand_id, code)`.
#[derive(Clone)]
pub struct CatalogImportService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    chunk_size: usize,
}

impl CatalogImportService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            chunk_size: config.catalog_import_chunk_size.max(1),
        }
    }

    /// Writes the batch in chunks of `catalog_import_chunk_size` rows, one
    /// transaction per chunk. A failing chunk rolls back alone; earlier chunks
    /// stay committed.
    #[instrument(skip(self, batch), fields(brand_id = %batch.brand_id))]
    pub async fn import(
        &self,
        batch: CatalogImportBatch,
    ) -> Result<CatalogImportSummary, ServiceError> {
        batch.validate_records()?;

        let brand_id = batch.brand_id;
        let (parts, labor) = batch.deduplicated();
        let now = Utc::now();
        let mut summary = CatalogImportSummary::default();

        for chunk in parts.chunks(self.chunk_size) {
            let rows = chunk.iter().map(|p| catalog_part::ActiveModel {
                id: Set(Uuid::new_v4()),
                brand_id: Set(brand_id),
                part_no: Set(p.part_no.clone()),
                name: Set(p.name.clone()),
                unit_price: Set(p.unit_price),
                valid_from: Set(p.valid_from),
                updated_at: Set(now),
            });

            let started = Instant::now();
            let txn = self.db.begin().await?;
            catalog_part::Entity::insert_many(rows)
                .on_conflict(
                    OnConflict::columns([
                        catalog_part::Column::BrandId,
                        catalog_part::Column::PartNo,
                    ])
                    .update_columns([
                        catalog_part::Column::Name,
                        catalog_part::Column::UnitPrice,
                        catalog_part::Column::ValidFrom,
                        catalog_part::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
            txn.commit().await?;
            record_transaction("catalog_import_parts", started, true);

            summary.parts_written += chunk.len();
            summary.chunks += 1;
            debug!(rows = chunk.len(), "Committed catalog part chunk");
        }

        for chunk in labor.chunks(self.chunk_size) {
            let rows = chunk.iter().map(|l| labor_operation::ActiveModel {
                id: Set(Uuid::new_v4()),
                brand_id: Set(brand_id),
                operation_code: Set(l.operation_code.clone()),
                name: Set(l.name.clone()),
                duration_hours: Set(l.duration_hours),
                hourly_rate: Set(l.hourly_rate),
                total_price: Set(l.total_price),
                updated_at: Set(now),
            });

            let started = Instant::now();
            let txn = self.db.begin().await?;
            labor_operation::Entity::insert_many(rows)
                .on_conflict(
                    OnConflict::columns([
                        labor_operation::Column::BrandId,
                        labor_operation::Column::OperationCode,
                    ])
                    .update_columns([
                        labor_operation::Column::Name,
                        labor_operation::Column::DurationHours,
                        labor_operation::Column::HourlyRate,
                        labor_operation::Column::TotalPrice,
                        labor_operation::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
            txn.commit().await?;
            record_transaction("catalog_import_labor", started, true);

            summary.labor_operations_written += chunk.len();
            summary.chunks += 1;
            debug!(rows = chunk.len(), "Committed labor operation chunk");
        }

        self.event_sender
            .send_or_log(Event::CatalogImported {
                brand_id,
                parts: summary.parts_written,
                labor_operations: summary.labor_operations_written,
            })
            .await;

        info!(
            "Imported catalog for brand {}: {} parts, {} labor operations in {} chunks",
            brand_id, summary.parts_written, summary.labor_operations_written, summary.chunks
        );
        Ok(summary)
    }
}
