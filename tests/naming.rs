mod common;

use market_fields::{
    FieldMapping, FieldType, MappingTable, NamingRules, Violation,
    mapping::lint_directory,
    naming::{MAX_NAME_LEN, NameProblem},
};
use proptest::prelude::*;

use common::{fixture_path, mappings_dir};

fn field_type() -> impl Strategy<Value = FieldType> {
    proptest::sample::select(FieldType::ALL.to_vec())
}

proptest! {
    #[test]
    fn generated_snake_case_names_validate(name in "[a-z][a-z0-9_]{0,40}") {
        let rules = NamingRules::standard();
        let reserved = matches!(rules.check(&name), Err(NameProblem::Reserved));
        prop_assert_eq!(rules.validate(&name), !reserved);
    }

    #[test]
    fn names_with_forbidden_characters_fail(prefix in "[a-z]{1,8}", bad in "[A-Z\\- .涨跌幅代码]", suffix in "[a-z]{0,8}") {
        let name = format!("{prefix}{bad}{suffix}");
        prop_assert!(!NamingRules::standard().validate(&name));
    }

    #[test]
    fn suggestions_always_validate(raw in "\\PC{0,80}", ty in field_type()) {
        let rules = NamingRules::standard();
        let suggestion = rules.suggest(&raw, ty);
        prop_assert!(rules.validate(&suggestion), "{raw:?} -> {suggestion:?}");
    }
}

#[test]
fn length_limit_is_inclusive() {
    let rules = NamingRules::standard();
    assert!(rules.validate(&"x".repeat(MAX_NAME_LEN)));
    assert_eq!(
        rules.check(&"x".repeat(MAX_NAME_LEN + 1)),
        Err(NameProblem::TooLong)
    );
}

#[test]
fn custom_reserved_words_are_honoured() {
    let rules = NamingRules::default().with_reserved(["price"]);
    assert!(!rules.validate("price"));
    assert!(NamingRules::standard().validate("price"));
}

#[test]
fn fixture_mappings_are_consistent() {
    let report = lint_directory(&mappings_dir(), NamingRules::standard()).expect("lint");
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(
        report.sources,
        vec!["eastmoney_fundflow", "eastmoney_realtime", "sina_realtime"]
    );
}

#[test]
fn broken_mappings_report_every_problem() {
    let report =
        lint_directory(&fixture_path("broken_mappings"), NamingRules::standard()).expect("lint");
    assert!(!report.is_clean());
    assert_eq!(report.load_errors.len(), 1);
    assert!(report.load_errors[0].message.contains("ticker"));

    let kinds: Vec<&str> = report
        .violations
        .iter()
        .map(|violation| match violation {
            Violation::InvalidName { .. } => "invalid_name",
            Violation::DuplicateCanonical { .. } => "duplicate_canonical",
            Violation::DuplicateSourceName { .. } => "duplicate_source_name",
            Violation::IncompatibleTypes { .. } => "incompatible_types",
            Violation::UnitDimension { .. } => "unit_dimension",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["invalid_name", "duplicate_canonical", "unit_dimension"]
    );
}

#[test]
fn compatible_types_across_sources_are_accepted() {
    let rules = NamingRules::standard();
    let east = MappingTable::new(
        "eastmoney_margin",
        vec![FieldMapping::new("融资余额", "margin_balance", FieldType::Balance)],
    )
    .with_dataset("margin");
    let sina = MappingTable::new(
        "sina_margin",
        vec![FieldMapping::new("融资余额(元)", "margin_balance", FieldType::Amount)],
    )
    .with_dataset("margin");
    let unrelated = MappingTable::new(
        "eastmoney_flow",
        vec![FieldMapping::new("融资余额", "margin_balance", FieldType::NetFlow)],
    )
    .with_dataset("fund_flow");
    assert!(rules.check_mapping([&east, &sina, &unrelated]).is_empty());
}

#[test]
fn hints_suggest_conventional_suffixes() {
    let table = MappingTable::new(
        "eastmoney_realtime",
        vec![
            FieldMapping::new("成交额", "turnover", FieldType::Amount),
            FieldMapping::new("成交额2", "turnover_amount", FieldType::Amount),
        ],
    );
    let hints = NamingRules::standard().hints(&table);
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].suggestion, "turnover_amount");
}
