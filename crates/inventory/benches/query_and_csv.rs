use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use stockroom_core::OwnerId;
use stockroom_inventory::{
    export_items, import_items, InventoryItem, ItemQuery, NewItem, SortField, SortOrder,
};

fn catalog(size: usize) -> Vec<InventoryItem> {
    let owner = OwnerId::new();
    let now = Utc::now();
    (0..size)
        .map(|i| {
            InventoryItem::create(
                owner,
                NewItem {
                    name: format!("Item {i:05}, grade \"{}\"", i % 7),
                    sku: Some(format!("SKU-{i:05}")),
                    quantity: (i as i64 * 37) % 500,
                    unit: Some("pcs".to_string()),
                    supplier: Some(format!("Supplier {}", i % 13)),
                    min_stock: (i % 3 == 0).then_some(25),
                },
                now,
            )
            .expect("bench fixture is valid")
        })
        .collect()
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("item_query");
    for size in [100usize, 1_000, 10_000] {
        let items = catalog(size);
        let query = ItemQuery {
            search: Some("supplier 4".to_string()),
            sort: SortField::Quantity,
            order: SortOrder::Desc,
            ..ItemQuery::default()
        };
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| black_box(query.run(items.clone())))
        });
    }
    group.finish();
}

fn bench_csv(c: &mut Criterion) {
    let mut group = c.benchmark_group("csv");
    for size in [100usize, 1_000, 10_000] {
        let items = catalog(size);
        let text = export_items(&items);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("export", size), &items, |b, items| {
            b.iter(|| black_box(export_items(items)))
        });
        group.bench_with_input(BenchmarkId::new("import", size), &text, |b, text| {
            b.iter(|| black_box(import_items(text).expect("exported csv parses")))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_query, bench_csv);
criterion_main!(benches);
