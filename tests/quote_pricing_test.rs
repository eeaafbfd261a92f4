mod common;

use assert_matches::assert_matches;
use common::{money, part, TestApp, AIR_FILTER, BRAKE_FLUID, OIL_FILTER, SERVICE_LABOR};
use maintenance_pricing::{
    entities::{quote, quote_item, DiscountSource, DiscountType, ItemType, QuoteStatus},
    errors::ServiceError,
    handlers::AppServices,
    services::{
        settings::keys as settings_keys, AddQuoteItemInput, CatalogImportBatch,
        CreateQuoteInput, DiscountPreset, QuoteDetails, QuoteNumberGenerator, QuoteTotals,
        SetQuoteDiscountInput, UpdateQuoteItemInput,
    },
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use std::sync::Arc;

fn assert_totals(details: &QuoteDetails, parts: Decimal, labor: Decimal, grand: Decimal) {
    let q = &details.quote;
    assert_eq!(money(q.parts_subtotal), money(parts), "parts subtotal");
    assert_eq!(money(q.labor_subtotal), money(labor), "labor subtotal");
    assert_eq!(money(q.subtotal), money(parts + labor), "subtotal");
    assert_eq!(money(q.grand_total), money(grand), "grand total");
}

/// Header totals must always equal a fresh recomputation from the items.
fn assert_consistent(details: &QuoteDetails) {
    let q = &details.quote;
    let fresh = QuoteTotals::from_items(&details.items, q.discount_type, q.discount_value, q.tax_rate);
    assert_eq!(money(fresh.subtotal), money(q.subtotal));
    assert_eq!(money(fresh.discount_amount), money(q.discount_amount));
    assert_eq!(money(fresh.tax_amount), money(q.tax_amount));
    assert_eq!(money(fresh.grand_total), money(q.grand_total));
}

fn item_total(details: &QuoteDetails, code: &str) -> Decimal {
    let item = details
        .items
        .iter()
        .find(|i| i.reference_code == code)
        .unwrap_or_else(|| panic!("line {code} present"));
    money(item.total_price)
}

#[tokio::test]
async fn materialized_quote_has_initial_totals() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;

    let q = &created.quote;
    assert_eq!(q.status, QuoteStatus::Draft);
    assert_eq!(q.version, 1);
    assert!(q.quote_no.starts_with("Q-"));
    assert_eq!(q.brand_name, "Acme Motors");
    assert_eq!(money(q.parts_subtotal), dec!(505));
    assert_eq!(money(q.labor_subtotal), dec!(400));
    assert_eq!(money(q.subtotal), dec!(905));
    assert_eq!(money(q.tax_rate), dec!(20));
    assert_eq!(money(q.tax_amount), dec!(181));
    assert_eq!(money(q.grand_total), dec!(1086));
    assert!(created.gaps.is_empty());

    let codes: Vec<&str> = created.items.iter().map(|i| i.reference_code.as_str()).collect();
    assert_eq!(codes, vec![OIL_FILTER, AIR_FILTER, SERVICE_LABOR]);
    let labor = &created.items[2];
    assert_eq!(labor.duration_hours.map(money), Some(dec!(0.5)));
    assert_eq!(labor.hourly_rate.map(money), Some(dec!(800)));
}

#[tokio::test]
async fn percent_quote_discount_taxes_the_discounted_base() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;

    let details = app
        .state
        .services
        .quotes
        .set_quote_discount(
            created.quote.id,
            SetQuoteDiscountInput {
                discount_type: DiscountType::Percent,
                discount_value: dec!(10),
            },
        )
        .await
        .unwrap();

    assert_eq!(money(details.quote.discount_amount), dec!(90.5));
    assert_eq!(money(details.quote.tax_amount), dec!(162.9));
    assert_eq!(money(details.quote.grand_total), dec!(977.4));
    assert_eq!(details.quote.version, 2);
    assert_consistent(&details);
}

#[tokio::test]
async fn uniform_discount_overwrites_every_line() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let bulk = &app.state.services.bulk_discount;

    // A first pass that the second one must replace, not add to.
    bulk.apply_uniform_discount(created.quote.id, dec!(50), dec!(50))
        .await
        .unwrap();
    let details = bulk
        .apply_uniform_discount(created.quote.id, dec!(10), dec!(15))
        .await
        .unwrap();

    assert_eq!(item_total(&details, OIL_FILTER), dec!(166.5));
    assert_eq!(item_total(&details, AIR_FILTER), dec!(288));
    assert_eq!(item_total(&details, SERVICE_LABOR), dec!(340));
    assert_eq!(money(details.quote.subtotal), dec!(794.5));
    assert!(details
        .items
        .iter()
        .all(|i| i.discount_source == DiscountSource::Manual && i.discount_preset.is_none()));
    assert_eq!(details.quote.applied_preset, None);
    assert_consistent(&details);
}

#[tokio::test]
async fn changing_quantity_reprices_line_and_parts_subtotal() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let first_part = created.items[0].id;

    let details = app
        .state
        .services
        .line_items
        .update_item(
            created.quote.id,
            first_part,
            UpdateQuoteItemInput {
                quantity: Some(dec!(3)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(item_total(&details, OIL_FILTER), dec!(555));
    assert_eq!(money(details.quote.parts_subtotal), dec!(875));
    assert_totals(&details, dec!(875), dec!(400), dec!(1530));
    assert_consistent(&details);
}

#[tokio::test]
async fn finalized_quote_rejects_new_items() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let quote_id = created.quote.id;

    let finalized = app.state.services.quotes.finalize(quote_id).await.unwrap();
    assert_eq!(finalized.quote.status, QuoteStatus::Finalized);
    assert!(finalized.quote.finalized_at.is_some());

    let result = app
        .state
        .services
        .line_items
        .add_item(
            quote_id,
            AddQuoteItemInput {
                item_type: ItemType::Part,
                reference_code: BRAKE_FLUID.to_string(),
                name: None,
                quantity: dec!(1),
                unit_price: None,
                discount_pct: None,
                duration_hours: None,
                hourly_rate: None,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::InvalidStatus(_)));

    let after = app.state.services.quotes.get_quote(quote_id).await.unwrap();
    assert_eq!(after.items.len(), 3);
    assert_eq!(money(after.quote.grand_total), dec!(1086));
    assert_eq!(after.quote.version, finalized.quote.version);
}

#[tokio::test]
async fn terminal_quotes_reject_every_mutation() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let quote_id = created.quote.id;
    let services = &app.state.services;

    let cancelled = services.quotes.cancel(quote_id).await.unwrap();
    assert_eq!(cancelled.quote.status, QuoteStatus::Cancelled);
    assert!(cancelled.quote.cancelled_at.is_some());
    assert!(services.locks.is_empty(), "terminal quotes drop their lock entry");

    assert_matches!(
        services.quotes.finalize(quote_id).await,
        Err(ServiceError::InvalidStatus(_))
    );
    assert_matches!(
        services.quotes.set_tax_rate(quote_id, dec!(10)).await,
        Err(ServiceError::InvalidStatus(_))
    );
    assert_matches!(
        services
            .bulk_discount
            .apply_preset(quote_id, DiscountPreset::Loyalty)
            .await,
        Err(ServiceError::InvalidStatus(_))
    );
    assert_matches!(
        services
            .line_items
            .remove_item(quote_id, created.items[0].id)
            .await,
        Err(ServiceError::InvalidStatus(_))
    );
}

#[tokio::test]
async fn add_and_remove_items_keep_totals_consistent() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let quote_id = created.quote.id;
    let line_items = &app.state.services.line_items;

    let added = line_items
        .add_item(
            quote_id,
            AddQuoteItemInput {
                item_type: ItemType::Part,
                reference_code: BRAKE_FLUID.to_string(),
                name: None,
                quantity: dec!(2),
                unit_price: None,
                discount_pct: Some(dec!(10)),
                duration_hours: None,
                hourly_rate: None,
            },
        )
        .await
        .unwrap();

    let fluid = added
        .items
        .iter()
        .find(|i| i.reference_code == BRAKE_FLUID)
        .unwrap();
    assert_eq!(fluid.sort_order, 3);
    assert_eq!(fluid.name, "Brake fluid");
    assert_eq!(money(fluid.total_price), dec!(171));
    assert_eq!(fluid.discount_source, DiscountSource::Manual);
    assert_eq!(money(added.quote.parts_subtotal), dec!(676));
    assert_consistent(&added);

    let removed = line_items.remove_item(quote_id, fluid.id).await.unwrap();
    assert_eq!(removed.items.len(), 3);
    assert_eq!(money(removed.quote.grand_total), dec!(1086));
    assert_consistent(&removed);
}

#[tokio::test]
async fn unknown_code_without_manual_price_is_not_found() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;

    let result = app
        .state
        .services
        .line_items
        .add_item(
            created.quote.id,
            AddQuoteItemInput {
                item_type: ItemType::Part,
                reference_code: "P-DOES-NOT-EXIST".to_string(),
                name: None,
                quantity: dec!(1),
                unit_price: None,
                discount_pct: None,
                duration_hours: None,
                hourly_rate: None,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));

    let manual = app
        .state
        .services
        .line_items
        .add_item(
            created.quote.id,
            AddQuoteItemInput {
                item_type: ItemType::Labor,
                reference_code: "L-DIAG".to_string(),
                name: Some("Diagnostics".to_string()),
                quantity: dec!(1),
                unit_price: None,
                discount_pct: None,
                duration_hours: Some(dec!(1.5)),
                hourly_rate: Some(dec!(600)),
            },
        )
        .await
        .unwrap();
    assert_eq!(item_total(&manual, "L-DIAG"), dec!(900));
    assert_eq!(money(manual.quote.labor_subtotal), dec!(1300));
}

#[tokio::test]
async fn negative_quantity_is_a_validation_error() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;

    let result = app
        .state
        .services
        .line_items
        .update_item(
            created.quote.id,
            created.items[0].id,
            UpdateQuoteItemInput {
                quantity: Some(dec!(-1)),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn line_discount_is_clamped_into_range() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;

    let details = app
        .state
        .services
        .line_items
        .update_item(
            created.quote.id,
            created.items[1].id,
            UpdateQuoteItemInput {
                discount_pct: Some(dec!(150)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let line = &details.items[1];
    assert_eq!(money(line.discount_pct), dec!(100));
    assert_eq!(money(line.total_price), Decimal::ZERO);
    assert_eq!(money(details.quote.parts_subtotal), dec!(185));
}

#[tokio::test]
async fn amount_discount_larger_than_subtotal_is_rejected() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;

    let result = app
        .state
        .services
        .quotes
        .set_quote_discount(
            created.quote.id,
            SetQuoteDiscountInput {
                discount_type: DiscountType::Amount,
                discount_value: dec!(1000),
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let details = app
        .state
        .services
        .quotes
        .set_quote_discount(
            created.quote.id,
            SetQuoteDiscountInput {
                discount_type: DiscountType::Amount,
                discount_value: dec!(105),
            },
        )
        .await
        .unwrap();
    assert_eq!(money(details.quote.discount_amount), dec!(105));
    assert_eq!(money(details.quote.tax_amount), dec!(160));
    assert_eq!(money(details.quote.grand_total), dec!(960));
}

#[tokio::test]
async fn tax_rate_change_recomputes_and_is_range_checked() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let quotes = &app.state.services.quotes;

    assert_matches!(
        quotes.set_tax_rate(created.quote.id, dec!(120)).await,
        Err(ServiceError::ValidationError(_))
    );

    let details = quotes.set_tax_rate(created.quote.id, dec!(0)).await.unwrap();
    assert_eq!(money(details.quote.tax_amount), Decimal::ZERO);
    assert_eq!(money(details.quote.grand_total), dec!(905));
}

#[tokio::test]
async fn preset_discount_reads_settings_and_tags_lines() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let settings = &app.state.services.settings;

    settings
        .set(&settings_keys::preset_parts_pct(DiscountPreset::Loyalty), "20")
        .await
        .unwrap();

    let details = app
        .state
        .services
        .bulk_discount
        .apply_preset(created.quote.id, DiscountPreset::Loyalty)
        .await
        .unwrap();

    // parts from the stored setting, labor from the config default (10%)
    assert_eq!(item_total(&details, OIL_FILTER), dec!(148));
    assert_eq!(item_total(&details, AIR_FILTER), dec!(256));
    assert_eq!(item_total(&details, SERVICE_LABOR), dec!(360));
    assert_eq!(details.quote.applied_preset.as_deref(), Some("loyalty"));
    assert!(details.items.iter().all(|i| {
        i.discount_source == DiscountSource::Preset && i.discount_preset.as_deref() == Some("loyalty")
    }));

    // A later preset replaces the earlier one.
    let details = app
        .state
        .services
        .bulk_discount
        .apply_preset(created.quote.id, DiscountPreset::WarrantyLapsed)
        .await
        .unwrap();
    assert_eq!(item_total(&details, OIL_FILTER), dec!(157.25));
    assert_eq!(item_total(&details, SERVICE_LABOR), dec!(320));
    assert_eq!(details.quote.applied_preset.as_deref(), Some("warranty_lapsed"));
    assert_consistent(&details);
}

#[tokio::test]
async fn missing_quote_is_not_found() {
    let app = TestApp::new().await;
    let result = app.state.services.quotes.get_quote(uuid::Uuid::new_v4()).await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn stale_header_write_is_a_concurrent_modification() {
    use maintenance_pricing::services::aggregator::recalculate_quote_totals;

    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let db = &*app.state.db;

    let stale = quote::Entity::find_by_id(created.quote.id)
        .one(db)
        .await
        .unwrap()
        .unwrap();

    // Another writer moves the version on.
    app.state
        .services
        .quotes
        .set_tax_rate(created.quote.id, dec!(10))
        .await
        .unwrap();

    let result = recalculate_quote_totals(db, stale).await;
    assert_matches!(result, Err(ServiceError::ConcurrentModification(id)) if id == created.quote.id);
}

#[tokio::test]
async fn concurrent_mutations_on_one_quote_serialize() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let quote_id = created.quote.id;

    let mut handles = Vec::new();
    for i in 0..8 {
        let line_items = app.state.services.line_items.clone();
        handles.push(tokio::spawn(async move {
            line_items
                .add_item(
                    quote_id,
                    AddQuoteItemInput {
                        item_type: ItemType::Part,
                        reference_code: BRAKE_FLUID.to_string(),
                        name: Some(format!("Brake fluid #{i}")),
                        quantity: dec!(1),
                        unit_price: None,
                        discount_pct: None,
                        duration_hours: None,
                        hourly_rate: None,
                    },
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let details = app.state.services.quotes.get_quote(quote_id).await.unwrap();
    assert_eq!(details.items.len(), 11);
    assert_eq!(details.quote.version, 9);
    let mut orders: Vec<i32> = details.items.iter().map(|i| i.sort_order).collect();
    orders.dedup();
    assert_eq!(orders.len(), 11, "sort orders are unique");
    assert_eq!(money(details.quote.parts_subtotal), dec!(1265));
    assert_consistent(&details);
}

#[tokio::test]
async fn failed_mutations_leave_no_lock_entries() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let services = &app.state.services;

    for _ in 0..20 {
        let result = services
            .line_items
            .update_item(
                uuid::Uuid::new_v4(),
                uuid::Uuid::new_v4(),
                UpdateQuoteItemInput {
                    quantity: Some(dec!(2)),
                    ..Default::default()
                },
            )
            .await;
        assert_matches!(result, Err(ServiceError::NotFound(_)));
    }
    assert_matches!(
        services.quotes.set_tax_rate(uuid::Uuid::new_v4(), dec!(10)).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        services
            .quotes
            .set_quote_discount(
                created.quote.id,
                SetQuoteDiscountInput {
                    discount_type: DiscountType::Percent,
                    discount_value: dec!(150),
                },
            )
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert!(services.locks.is_empty(), "{} lock entries left", services.locks.len());

    // Successful mutations release their entry too.
    services
        .quotes
        .set_tax_rate(created.quote.id, dec!(10))
        .await
        .unwrap();
    assert!(services.locks.is_empty());
}

#[tokio::test]
async fn caller_price_on_hourly_labor_becomes_a_flat_price() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let line_items = &app.state.services.line_items;

    let added = line_items
        .add_item(
            created.quote.id,
            AddQuoteItemInput {
                item_type: ItemType::Labor,
                reference_code: SERVICE_LABOR.to_string(),
                name: Some("Extra service".to_string()),
                quantity: dec!(1),
                unit_price: Some(dec!(100)),
                discount_pct: None,
                duration_hours: None,
                hourly_rate: None,
            },
        )
        .await
        .unwrap();
    let extra = added.items.last().unwrap();
    assert_eq!(money(extra.unit_price), dec!(100));
    assert_eq!(extra.hourly_rate, None);
    assert_eq!(money(extra.total_price), dec!(100));
    assert_eq!(money(added.quote.labor_subtotal), dec!(500));
    assert_consistent(&added);

    // Re-pricing the templated hourly line works the same way.
    let hourly = &created.items[2];
    assert!(hourly.hourly_rate.is_some());
    let updated = line_items
        .update_item(
            created.quote.id,
            hourly.id,
            UpdateQuoteItemInput {
                unit_price: Some(dec!(250)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let repriced = updated.items.iter().find(|i| i.id == hourly.id).unwrap();
    assert_eq!(repriced.hourly_rate, None);
    assert_eq!(money(repriced.total_price), dec!(250));
    assert_eq!(money(updated.quote.labor_subtotal), dec!(350));
    assert_consistent(&updated);

    let both = line_items
        .add_item(
            created.quote.id,
            AddQuoteItemInput {
                item_type: ItemType::Labor,
                reference_code: SERVICE_LABOR.to_string(),
                name: None,
                quantity: dec!(1),
                unit_price: Some(dec!(100)),
                discount_pct: None,
                duration_hours: None,
                hourly_rate: Some(dec!(900)),
            },
        )
        .await;
    assert_matches!(both, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn oversized_values_are_validation_errors() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let line_items = &app.state.services.line_items;

    let result = line_items
        .update_item(
            created.quote.id,
            created.items[0].id,
            UpdateQuoteItemInput {
                quantity: Some(Decimal::MAX),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let result = line_items
        .add_item(
            created.quote.id,
            AddQuoteItemInput {
                item_type: ItemType::Part,
                reference_code: "P-GOLD".to_string(),
                name: Some("Gold-plated part".to_string()),
                quantity: dec!(1),
                unit_price: Some(Decimal::MAX),
                discount_pct: None,
                duration_hours: None,
                hourly_rate: None,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let after = app.state.services.quotes.get_quote(created.quote.id).await.unwrap();
    assert_eq!(after.items.len(), 3);
    assert_eq!(after.quote.version, created.quote.version);
    assert_eq!(money(after.quote.grand_total), dec!(1086));
}

struct FixedQuoteNumber(String);

impl QuoteNumberGenerator for FixedQuoteNumber {
    fn next_quote_no(&self) -> String {
        self.0.clone()
    }
}

#[tokio::test]
async fn materialization_is_all_or_nothing() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;
    let template_id = created.quote.template_id.unwrap();

    let services = AppServices::with_number_generator(
        app.state.db.clone(),
        app.state.event_sender.clone(),
        app.state.config.clone(),
        Arc::new(FixedQuoteNumber(created.quote.quote_no.clone())),
    );
    let result = services
        .materializer
        .create_quote_from_template(CreateQuoteInput {
            template_id,
            brand_id: app.brand_id,
            brand_name: "Acme Motors".to_string(),
            model_name: None,
            sub_model_name: None,
            customer_name: None,
        })
        .await;
    assert_matches!(result, Err(ServiceError::DatabaseError(_)));

    let db = &*app.state.db;
    assert_eq!(quote::Entity::find().count(db).await.unwrap(), 1);
    assert_eq!(quote_item::Entity::find().count(db).await.unwrap(), 3);
}

#[tokio::test]
async fn quote_lines_keep_their_snapshot_after_catalog_changes() {
    let app = TestApp::new().await;
    let created = app.seed_standard_quote().await;

    app.state
        .services
        .catalog_import
        .import(CatalogImportBatch {
            brand_id: app.brand_id,
            parts: vec![part(OIL_FILTER, "Oil filter (new supplier)", dec!(999))],
            labor_operations: vec![],
        })
        .await
        .unwrap();

    let after = app.state.services.quotes.get_quote(created.quote.id).await.unwrap();
    let before_oil = &created.items[0];
    let after_oil = after.items.iter().find(|i| i.id == before_oil.id).unwrap();
    assert_eq!(after_oil.name, "Oil filter");
    assert_eq!(money(after_oil.unit_price), dec!(185));
    assert_eq!(money(after_oil.total_price), dec!(185));
    assert_eq!(money(after.quote.subtotal), dec!(905));
    assert_eq!(money(after.quote.grand_total), dec!(1086));
    assert_eq!(after.quote.version, created.quote.version);

    // New quotes pick up the new price.
    let fresh = app.create_quote(created.quote.template_id.unwrap()).await;
    assert_eq!(money(fresh.quote.parts_subtotal), dec!(1319));
}
