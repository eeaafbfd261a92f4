#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use maintenance_pricing::{
    config::AppConfig,
    db,
    entities::{maintenance_template, template_item, ItemType},
    events::{self, EventSender},
    services::{
        catalog_import::{CatalogPartRecord, LaborOperationRecord},
        CatalogImportBatch, CreateQuoteInput, MaterializedQuote,
    },
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Part and labor codes seeded by [`TestApp::seed_standard_catalog`].
pub const OIL_FILTER: &str = "P-OIL-FILTER";
pub const AIR_FILTER: &str = "P-AIR-FILTER";
pub const SERVICE_LABOR: &str = "L-SERVICE";
pub const BRAKE_FLUID: &str = "P-BRAKE-FLUID";

/// Template line used by the seed helpers: `(type, code, quantity, duration override)`.
pub type TemplateLine<'a> = (ItemType, &'a str, Decimal, Option<Decimal>);

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub brand_id: Uuid,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Construct a test application after adjusting the default test config.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.cors_allow_any_origin = true;
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), Arc::new(cfg), event_sender);
        let router =
            maintenance_pricing::build_router(state.clone()).expect("router builds for tests");

        Self {
            router,
            state,
            brand_id: Uuid::new_v4(),
            _event_task: event_task,
        }
    }

    /// Send a request against the router and decode the JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Parts 185 and 320, plus 0.5 h of labor at 800/h, for `self.brand_id`.
    pub async fn seed_standard_catalog(&self) {
        let batch = CatalogImportBatch {
            brand_id: self.brand_id,
            parts: vec![
                part(OIL_FILTER, "Oil filter", dec!(185)),
                part(AIR_FILTER, "Air filter", dec!(320)),
                part(BRAKE_FLUID, "Brake fluid", dec!(95)),
            ],
            labor_operations: vec![LaborOperationRecord {
                operation_code: SERVICE_LABOR.to_string(),
                name: "Periodic service".to_string(),
                duration_hours: dec!(0.5),
                hourly_rate: dec!(800),
                total_price: None,
            }],
        };
        self.state
            .services
            .catalog_import
            .import(batch)
            .await
            .expect("seed catalog");
    }

    /// Inserts a template for `self.brand_id` with the given lines in order.
    pub async fn seed_template(
        &self,
        name: &str,
        period_km: Option<i32>,
        period_month: Option<i32>,
        lines: &[TemplateLine<'_>],
    ) -> Uuid {
        self.seed_template_for_model(name, None, period_km, period_month, lines)
            .await
    }

    pub async fn seed_template_for_model(
        &self,
        name: &str,
        model_id: Option<Uuid>,
        period_km: Option<i32>,
        period_month: Option<i32>,
        lines: &[TemplateLine<'_>],
    ) -> Uuid {
        let now = Utc::now();
        let template_id = Uuid::new_v4();
        maintenance_template::ActiveModel {
            id: Set(template_id),
            brand_id: Set(self.brand_id),
            model_id: Set(model_id),
            sub_model_id: Set(None),
            name: Set(name.to_string()),
            period_km: Set(period_km),
            period_month: Set(period_month),
            service_type: Set("PERIODIC".to_string()),
            approved: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed template");

        for (position, (item_type, code, quantity, duration_override)) in lines.iter().enumerate() {
            template_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                template_id: Set(template_id),
                item_type: Set(*item_type),
                reference_code: Set(code.to_string()),
                quantity: Set(*quantity),
                duration_override: Set(*duration_override),
                sort_order: Set(position as i32),
            }
            .insert(&*self.state.db)
            .await
            .expect("seed template item");
        }

        template_id
    }

    /// The quote of scenario "two parts and half an hour of labor".
    pub async fn seed_standard_quote(&self) -> MaterializedQuote {
        self.seed_standard_catalog().await;
        let template_id = self
            .seed_template(
                "10k service",
                Some(10_000),
                Some(12),
                &[
                    (ItemType::Part, OIL_FILTER, dec!(1), None),
                    (ItemType::Part, AIR_FILTER, dec!(1), None),
                    (ItemType::Labor, SERVICE_LABOR, dec!(1), None),
                ],
            )
            .await;
        self.create_quote(template_id).await
    }

    pub async fn create_quote(&self, template_id: Uuid) -> MaterializedQuote {
        self.state
            .services
            .materializer
            .create_quote_from_template(CreateQuoteInput {
                template_id,
                brand_id: self.brand_id,
                brand_name: "Acme Motors".to_string(),
                model_name: Some("Roadster".to_string()),
                sub_model_name: None,
                customer_name: Some("J. Doe".to_string()),
            })
            .await
            .expect("create quote from template")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn part(code: &str, name: &str, price: Decimal) -> CatalogPartRecord {
    CatalogPartRecord {
        part_no: code.to_string(),
        name: name.to_string(),
        unit_price: price,
        valid_from: None,
    }
}

/// Money compared at the stored scale; SQLite round-trips decimals through REAL.
pub fn money(value: Decimal) -> Decimal {
    value.round_dp(4).normalize()
}

/// Reads a decimal serialized either as a JSON string or a number.
pub fn json_decimal(value: &Value) -> Decimal {
    let decimal = match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected decimal, got {other}"),
    };
    money(decimal)
}
