use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use maintenance_pricing::{
    entities::{catalog_part, labor_operation, maintenance_template, template_item, DiscountType, ItemType},
    services::{matrix::assemble_matrix, CatalogLookup, QuoteTotals},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn lookup(brand_id: Uuid, parts: usize, labor: usize) -> CatalogLookup {
    let now = Utc::now();
    let mut lookup = CatalogLookup::default();
    for i in 0..parts {
        let part_no = format!("P-{i:05}");
        lookup.parts.insert(
            part_no.clone(),
            catalog_part::Model {
                id: Uuid::new_v4(),
                brand_id,
                part_no,
                name: format!("Part {i}"),
                unit_price: Decimal::from(50 + i as i64),
                valid_from: None,
                updated_at: now,
            },
        );
    }
    for i in 0..labor {
        let operation_code = format!("L-{i:04}");
        lookup.labor.insert(
            operation_code.clone(),
            labor_operation::Model {
                id: Uuid::new_v4(),
                brand_id,
                operation_code,
                name: format!("Operation {i}"),
                duration_hours: dec!(0.5),
                hourly_rate: dec!(800),
                total_price: None,
                updated_at: now,
            },
        );
    }
    lookup
}

/// `periods` templates, each referencing a rotating window of the catalog.
fn templates(
    brand_id: Uuid,
    periods: usize,
    lines: usize,
    parts: usize,
) -> Vec<(maintenance_template::Model, Vec<template_item::Model>)> {
    let now = Utc::now();
    (0..periods)
        .map(|p| {
            let template_id = Uuid::new_v4();
            let template = maintenance_template::Model {
                id: template_id,
                brand_id,
                model_id: None,
                sub_model_id: None,
                name: format!("{}k service", (p + 1) * 10),
                period_km: Some(((p + 1) * 10_000) as i32),
                period_month: Some(((p + 1) * 12) as i32),
                service_type: "PERIODIC".to_string(),
                approved: true,
                created_at: now,
                updated_at: now,
            };
            let items = (0..lines)
                .map(|l| {
                    let labor = l % 5 == 0;
                    template_item::Model {
                        id: Uuid::new_v4(),
                        template_id,
                        item_type: if labor { ItemType::Labor } else { ItemType::Part },
                        reference_code: if labor {
                            format!("L-{:04}", l % 20)
                        } else {
                            format!("P-{:05}", (p * 7 + l) % parts)
                        },
                        quantity: Decimal::ONE,
                        duration_override: None,
                        sort_order: l as i32,
                    }
                })
                .collect();
            (template, items)
        })
        .collect()
}

fn matrix_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_matrix");
    let brand_id = Uuid::new_v4();
    let catalog = lookup(brand_id, 500, 20);

    for periods in [4usize, 12, 24] {
        let loaded = templates(brand_id, periods, 40, 500);
        group.bench_with_input(BenchmarkId::from_parameter(periods), &loaded, |b, loaded| {
            b.iter(|| assemble_matrix(brand_id, None, black_box(loaded), &catalog));
        });
    }

    group.finish();
}

fn totals_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("quote_totals");

    for size in [10usize, 100, 1_000] {
        let lines: Vec<(ItemType, Decimal)> = (0..size)
            .map(|i| {
                let item_type = if i % 3 == 0 { ItemType::Labor } else { ItemType::Part };
                (item_type, Decimal::new(12_345 + i as i64, 2))
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &lines, |b, lines| {
            b.iter(|| {
                QuoteTotals::compute(
                    black_box(lines.iter().copied()),
                    DiscountType::Percent,
                    dec!(10),
                    dec!(20),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, matrix_benchmark, totals_benchmark);
criterion_main!(benches);
