mod common;

use std::{fs, sync::Arc, thread};

use encoding_rs::UTF_8;
use market_fields::{
    Cell, CoercionReason, ConfigError, FieldMapping, FieldStandardizer, FieldType, MappingRegistry,
    MappingTable, NamingRules, RawTable, Unit, io_utils, standardize::standardize_with,
};
use proptest::prelude::*;
use serde_json::{Value, json};

use common::{TestWorkspace, assert_close, fixture_path, mappings_dir};

fn load_raw(name: &str) -> RawTable {
    io_utils::read_raw_table(&fixture_path(name), UTF_8, None, None).expect("raw fixture")
}

fn numbers(table: &market_fields::StandardizedTable, column: &str) -> Vec<Option<f64>> {
    table
        .column(column)
        .unwrap_or_else(|| panic!("column {column}"))
        .values
        .iter()
        .map(Cell::as_f64)
        .collect()
}

#[test]
fn eastmoney_quote_is_renamed_scaled_and_reported() {
    let standardizer = FieldStandardizer::from_dir(mappings_dir());
    let (table, report) = standardizer
        .standardize(&load_raw("eastmoney_realtime.csv"), "eastmoney_realtime")
        .expect("standardize");

    assert_eq!(
        table.column_names(),
        vec![
            "symbol",
            "name",
            "price",
            "pct_change",
            "volume",
            "turnover_amount"
        ]
    );
    assert_eq!(table.row_count(), 3);
    assert_eq!(
        table.column("symbol").unwrap().values,
        vec![Cell::text("600000"), Cell::text("000001"), Cell::text("300750")]
    );

    let pct = numbers(&table, "pct_change");
    assert_close(pct[0].unwrap(), 0.015);
    assert_close(pct[1].unwrap(), -0.003);
    assert_close(pct[2].unwrap(), 0.0325);

    assert_eq!(
        numbers(&table, "volume"),
        vec![Some(1_234_500.0), None, Some(200_000.0)]
    );
    assert_eq!(
        numbers(&table, "turnover_amount"),
        vec![Some(12_345_000.0), Some(880_000.0), Some(50_000_000.0)]
    );
    assert_eq!(numbers(&table, "price")[1], None);

    assert_eq!(report.unmapped_columns, vec!["市盈率"]);
    assert!(report.drift.is_empty());
    assert_eq!(report.coercions.len(), 1);
    assert_eq!(report.coercions[0].field, "volume");
    assert_eq!(report.coercions[0].row, 1);
    assert_eq!(report.coercions[0].raw, "abc");
    assert_eq!(report.coercions[0].reason, CoercionReason::NotNumeric);
    assert_eq!(report.rows_coerced, 1);
}

#[test]
fn interchangeable_sources_agree_on_schema() {
    let standardizer = FieldStandardizer::from_dir(mappings_dir());
    let (east, _) = standardizer
        .standardize(&load_raw("eastmoney_realtime.csv"), "eastmoney_realtime")
        .unwrap();
    let (sina, sina_report) = standardizer
        .standardize(&load_raw("sina_realtime.json"), "sina_realtime")
        .unwrap();

    assert_eq!(east.column_names(), sina.column_names());
    assert_eq!(
        sina.column("symbol").unwrap().values,
        vec![Cell::text("000001"), Cell::text("600000")]
    );
    assert_close(numbers(&sina, "pct_change")[0].unwrap(), -0.003);
    assert_close(numbers(&east, "pct_change")[1].unwrap(), -0.003);
    assert_eq!(numbers(&sina, "turnover_amount"), vec![Some(12_600_000.0), None]);
    assert!(sina_report.is_clean());
}

#[test]
fn fund_flow_dates_and_yi_yuan_amounts() {
    let standardizer = FieldStandardizer::from_dir(mappings_dir());
    let (table, report) = standardizer
        .standardize(&load_raw("eastmoney_fundflow.csv"), "eastmoney_fundflow")
        .unwrap();
    assert_eq!(
        table.column("date").unwrap().values,
        vec![
            Cell::text("2024-06-03"),
            Cell::text("2024-06-04"),
            Cell::text("2024-06-05")
        ]
    );
    assert_eq!(
        numbers(&table, "main_net_inflow"),
        vec![Some(125_000_000.0), Some(-40_000_000.0), None]
    );
    let ratio = numbers(&table, "main_net_inflow_ratio");
    assert_close(ratio[0].unwrap(), 0.055);
    assert_close(ratio[1].unwrap(), -0.021);
    assert_eq!(ratio[2], None);
    assert_eq!(report.unmapped_columns, vec!["超大单净流入-净额"]);
    assert!(report.coercions.is_empty());
}

#[test]
fn missing_column_drops_only_that_field() {
    let raw = RawTable::from_records(&[
        json!({"代码": "600000", "名称": "浦发银行", "最新价": "10.5", "涨跌幅": "1.5", "成交量": "10"}),
    ])
    .unwrap();
    let standardizer = FieldStandardizer::from_dir(mappings_dir());
    let (table, report) = standardizer.standardize(&raw, "eastmoney_realtime").unwrap();

    assert_eq!(
        table.column_names(),
        vec!["symbol", "name", "price", "pct_change", "volume"]
    );
    assert_eq!(report.fields_dropped, vec!["turnover_amount"]);
    assert_eq!(report.drift.len(), 1);
    assert_eq!(report.drift[0].source_name, "成交额");
    assert_eq!(numbers(&table, "volume"), vec![Some(1000.0)]);
}

#[test]
fn zero_matched_columns_yield_every_canonical_column_empty() {
    let raw = RawTable::from_records(&[json!({"unrelated": 1}), json!({"unrelated": 2})]).unwrap();
    let standardizer = FieldStandardizer::from_dir(mappings_dir());
    let (table, report) = standardizer.standardize(&raw, "eastmoney_realtime").unwrap();

    assert_eq!(table.row_count(), 0);
    assert_eq!(table.columns().len(), 6);
    assert!(table.columns().iter().all(|column| column.values.is_empty()));
    assert_eq!(report.drift.len(), 6);
    assert_eq!(report.unmapped_columns, vec!["unrelated"]);
    assert_eq!(table.to_json_string().unwrap(), "[]");
}

#[test]
fn standardizing_twice_is_stable() {
    let raw = load_raw("eastmoney_realtime.csv");
    let standardizer = FieldStandardizer::from_dir(mappings_dir());
    let first = standardizer.standardize(&raw, "eastmoney_realtime").unwrap();
    let second = standardizer.standardize(&raw, "eastmoney_realtime").unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.0.to_json_string().unwrap(),
        second.0.to_json_string().unwrap()
    );
}

#[test]
fn unknown_source_is_a_configuration_error() {
    let standardizer = FieldStandardizer::from_dir(mappings_dir());
    let err = standardizer
        .standardize(&RawTable::default(), "tushare_realtime")
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownSource(ref id) if id == "tushare_realtime"));
}

#[test]
fn duplicate_canonical_name_fails_at_load() {
    let workspace = TestWorkspace::new();
    workspace.copy_fixture("broken_mappings/duplicate_names.yaml", "duplicate_names.yaml");
    let standardizer = FieldStandardizer::from_dir(workspace.path());
    let err = standardizer
        .standardize(&RawTable::default(), "duplicate_names")
        .unwrap_err();
    assert!(matches!(err, ConfigError::Naming { .. }));
    assert_eq!(err.violations().len(), 2);
    assert!(!standardizer.registry().is_loaded("duplicate_names"));
}

#[test]
fn pct_change_scenario_follows_declared_unit() {
    let raw = RawTable::from_records(&[json!({"代码": "600000", "涨跌幅": "1.50"})]).unwrap();
    let mapping = |unit: Option<Unit>| {
        let mut pct = FieldMapping::new("涨跌幅", "pct_change", FieldType::Ratio);
        pct.source_unit = unit;
        MappingTable::new(
            "eastmoney_realtime",
            vec![FieldMapping::new("代码", "symbol", FieldType::Symbol), pct],
        )
    };

    let (as_declared, _) = standardize_with(&mapping(Some(Unit::Fraction)), &raw);
    let json: Value = serde_json::from_str(&as_declared.to_json_string().unwrap()).unwrap();
    assert_eq!(json, json!([{"symbol": "600000", "pct_change": 1.5}]));

    let (as_percent, _) = standardize_with(&mapping(Some(Unit::Percent)), &raw);
    let json: Value = serde_json::from_str(&as_percent.to_json_string().unwrap()).unwrap();
    assert_eq!(json, json!([{"symbol": "600000", "pct_change": 0.015}]));
}

#[test]
fn concurrent_first_load_converges_on_one_table() {
    let registry = Arc::new(MappingRegistry::from_dir(mappings_dir()));
    let tables = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                scope.spawn(move || registry.resolve("eastmoney_realtime").expect("resolve"))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect::<Vec<_>>()
    });
    assert!(tables.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert!(Arc::ptr_eq(
        &tables[0],
        &registry.resolve("eastmoney_realtime").unwrap()
    ));
}

#[test]
fn gbk_input_standardizes_like_utf8() {
    let workspace = TestWorkspace::new();
    let text = fs::read_to_string(fixture_path("eastmoney_realtime.csv")).unwrap();
    let (encoded, _, _) = encoding_rs::GBK.encode(&text);
    let path = workspace.path().join("quote_gbk.csv");
    fs::write(&path, encoded.as_ref()).unwrap();

    let gbk = io_utils::read_raw_table(&path, encoding_rs::GBK, None, None).unwrap();
    let standardizer = FieldStandardizer::from_dir(mappings_dir());
    let from_gbk = standardizer.standardize(&gbk, "eastmoney_realtime").unwrap();
    let from_utf8 = standardizer
        .standardize(&load_raw("eastmoney_realtime.csv"), "eastmoney_realtime")
        .unwrap();
    assert_eq!(from_gbk, from_utf8);
}

fn raw_cell() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<f64>().prop_map(|x| serde_json::Number::from_f64(x).map_or(Value::Null, Value::Number)),
        "[-+]?[0-9,]{0,12}(\\.[0-9]{0,4})?%?".prop_map(Value::String),
        "\\PC{0,12}".prop_map(Value::String),
        prop_oneof![Just("inf"), Just("-"), Just("nan"), Just("1e400")]
            .prop_map(|s| Value::String(s.to_string())),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn output_is_always_json_safe(rows in proptest::collection::vec((raw_cell(), raw_cell(), raw_cell()), 0..12)) {
        let mapping = MappingTable::new(
            "sina_fundflow",
            vec![
                FieldMapping::new("净流入", "net_inflow", FieldType::NetFlow).with_unit(Unit::YiYuan),
                FieldMapping::new("涨跌幅", "pct_change", FieldType::Rate).with_unit(Unit::Percent),
                FieldMapping::new("代码", "symbol", FieldType::Symbol),
            ],
        );
        let records: Vec<Value> = rows
            .into_iter()
            .map(|(flow, pct, code)| json!({"净流入": flow, "涨跌幅": pct, "代码": code}))
            .collect();
        let raw = RawTable::from_records(&records).unwrap();
        let (table, _) = standardize_with(&mapping, &raw);

        let rendered = table.to_json_string().unwrap();
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        for record in parsed.as_array().unwrap() {
            for (name, value) in record.as_object().unwrap() {
                prop_assert!(NamingRules::standard().validate(name));
                match value {
                    Value::Number(number) => prop_assert!(number.as_f64().is_some_and(f64::is_finite)),
                    Value::String(text) => prop_assert!(!text.trim().is_empty()),
                    Value::Null => {}
                    other => prop_assert!(false, "unexpected value {other:?}"),
                }
            }
        }
    }
}
