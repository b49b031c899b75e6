use std::hint::black_box;

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use market_fields::{
    FieldMapping, FieldType, MappingTable, RawTable, Unit, standardize::standardize_with,
    units::convert_column,
};
use serde_json::Value;

fn quote_mapping() -> MappingTable {
    MappingTable::new(
        "eastmoney_realtime",
        vec![
            FieldMapping::new("代码", "symbol", FieldType::Symbol),
            FieldMapping::new("名称", "name", FieldType::Name),
            FieldMapping::new("最新价", "price", FieldType::Value),
            FieldMapping::new("涨跌幅", "pct_change", FieldType::Rate).with_unit(Unit::Percent),
            FieldMapping::new("成交量", "volume", FieldType::Volume).with_unit(Unit::Lot),
            FieldMapping::new("成交额", "turnover_amount", FieldType::Amount)
                .with_unit(Unit::WanYuan),
        ],
    )
    .with_dataset("realtime_quote")
}

fn generate_quotes(rows: usize) -> RawTable {
    let columns = ["代码", "名称", "最新价", "涨跌幅", "成交量", "成交额", "市盈率"]
        .map(str::to_string)
        .to_vec();
    let data = (0..rows)
        .map(|i| {
            let price = if i % 50 == 0 {
                Value::from("-")
            } else {
                Value::from(format!("{:.2}", 5.0 + (i % 400) as f64 * 0.25))
            };
            vec![
                Value::from(format!("sh{:06}", 600_000 + i % 4000)),
                Value::from(format!("股票{i}")),
                price,
                Value::from(format!("{:.2}", (i % 21) as f64 - 10.0)),
                Value::from((i * 37 % 100_000) as u64),
                Value::from(format!("{},{:03}.5", i % 900 + 1, i % 1000)),
                Value::from(12.5),
            ]
        })
        .collect();
    RawTable::new(columns, data).expect("generated table is rectangular")
}

fn bench_convert_column(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_column");
    for size in [1_000usize, 100_000] {
        let values: Vec<Option<f64>> = (0..size)
            .map(|i| (i % 17 != 0).then_some(i as f64 * 1.25))
            .collect();
        group.bench_with_input(BenchmarkId::new("yi_yuan", size), &values, |b, values| {
            b.iter(|| convert_column(black_box(values), Unit::YiYuan));
        });
    }
    group.finish();
}

fn bench_standardize(c: &mut Criterion) {
    let mapping = quote_mapping();
    let mut group = c.benchmark_group("standardize_with");
    for rows in [1_000usize, 20_000] {
        let raw = generate_quotes(rows);
        group.bench_with_input(BenchmarkId::new("realtime_quote", rows), &raw, |b, raw| {
            b.iter_batched(
                || (),
                |_| standardize_with(&mapping, black_box(raw)),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_convert_column, bench_standardize);
criterion_main!(benches);
