use std::{
    collections::{BTreeMap, HashSet, btree_map::Entry},
    fmt,
    sync::OnceLock,
};

use heck::ToSnakeCase;
use itertools::Itertools;
use regex::Regex;
use serde::Serialize;

use crate::{field_type::FieldType, mapping::MappingTable, units::Unit};

pub const MAX_NAME_LEN: usize = 64;

const RESERVED_WORDS: &[&str] = &[
    "index", "class", "type", "def", "self", "match", "struct", "fn", "let", "import",
    "return", "none", "null", "true", "false", "level_0",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameProblem {
    Empty,
    TooLong,
    Pattern,
    Reserved,
}

impl fmt::Display for NameProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameProblem::Empty => f.write_str("name is empty"),
            NameProblem::TooLong => write!(f, "name exceeds {MAX_NAME_LEN} characters"),
            NameProblem::Pattern => f.write_str("name must match ^[a-z][a-z0-9_]*$"),
            NameProblem::Reserved => f.write_str("name is a reserved word"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    InvalidName {
        source_id: String,
        canonical_name: String,
        problem: NameProblem,
    },
    DuplicateCanonical {
        source_id: String,
        canonical_name: String,
    },
    DuplicateSourceName {
        source_id: String,
        source_name: String,
    },
    IncompatibleTypes {
        dataset: String,
        canonical_name: String,
        first: (String, FieldType),
        second: (String, FieldType),
    },
    UnitDimension {
        source_id: String,
        canonical_name: String,
        field_type: FieldType,
        unit: Unit,
    },
}

impl Violation {
    pub fn subject(&self) -> &str {
        match self {
            Violation::InvalidName { source_id, .. }
            | Violation::DuplicateCanonical { source_id, .. }
            | Violation::DuplicateSourceName { source_id, .. }
            | Violation::UnitDimension { source_id, .. } => source_id,
            Violation::IncompatibleTypes { second, .. } => &second.0,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::InvalidName {
                source_id,
                canonical_name,
                problem,
            } => write!(f, "[{source_id}] '{canonical_name}': {problem}"),
            Violation::DuplicateCanonical {
                source_id,
                canonical_name,
            } => write!(
                f,
                "[{source_id}] canonical name '{canonical_name}' is mapped more than once"
            ),
            Violation::DuplicateSourceName {
                source_id,
                source_name,
            } => write!(
                f,
                "[{source_id}] raw column '{source_name}' is claimed by more than one entry"
            ),
            Violation::IncompatibleTypes {
                dataset,
                canonical_name,
                first,
                second,
            } => write!(
                f,
                "[{dataset}] '{canonical_name}' is {} in '{}' but {} in '{}'",
                first.1, first.0, second.1, second.0
            ),
            Violation::UnitDimension {
                source_id,
                canonical_name,
                field_type,
                unit,
            } => write!(
                f,
                "[{source_id}] '{canonical_name}' declares unit '{unit}' which does not apply to {field_type} fields"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamingHint {
    pub source_id: String,
    pub canonical_name: String,
    pub field_type: FieldType,
    pub suggestion: String,
}

#[derive(Debug, Clone)]
pub struct NamingRules {
    pattern: Regex,
    max_len: usize,
    reserved: HashSet<String>,
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            pattern: Regex::new(r"^[a-z][a-z0-9_]*$").expect("canonical name pattern compiles"),
            max_len: MAX_NAME_LEN,
            reserved: RESERVED_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl NamingRules {
    pub fn standard() -> &'static NamingRules {
        static RULES: OnceLock<NamingRules> = OnceLock::new();
        RULES.get_or_init(NamingRules::default)
    }

    pub fn with_reserved<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(words.into_iter().map(Into::into));
        self
    }

    pub fn validate(&self, name: &str) -> bool {
        self.check(name).is_ok()
    }

    pub fn check(&self, name: &str) -> Result<(), NameProblem> {
        if name.is_empty() {
            return Err(NameProblem::Empty);
        }
        if name.len() > self.max_len {
            return Err(NameProblem::TooLong);
        }
        if !self.pattern.is_match(name) {
            return Err(NameProblem::Pattern);
        }
        if self.reserved.contains(name) {
            return Err(NameProblem::Reserved);
        }
        Ok(())
    }

    pub fn check_mapping<'a, I>(&self, tables: I) -> Vec<Violation>
    where
        I: IntoIterator<Item = &'a MappingTable>,
    {
        let tables: Vec<&MappingTable> = tables.into_iter().collect();
        let mut violations = Vec::new();
        for table in &tables {
            violations.extend(self.check_table(table));
        }
        violations.extend(check_cross_source(&tables));
        violations
    }

    pub fn check_table(&self, table: &MappingTable) -> Vec<Violation> {
        let source_id = &table.source;
        let mut violations = Vec::new();

        for entry in &table.fields {
            if let Err(problem) = self.check(&entry.canonical_name) {
                violations.push(Violation::InvalidName {
                    source_id: source_id.clone(),
                    canonical_name: entry.canonical_name.clone(),
                    problem,
                });
            }
            if let Some(unit) = entry.source_unit
                && !entry.field_type.accepts_unit(unit)
            {
                violations.push(Violation::UnitDimension {
                    source_id: source_id.clone(),
                    canonical_name: entry.canonical_name.clone(),
                    field_type: entry.field_type,
                    unit,
                });
            }
        }

        for canonical_name in table.fields.iter().map(|e| &e.canonical_name).duplicates() {
            violations.push(Violation::DuplicateCanonical {
                source_id: source_id.clone(),
                canonical_name: canonical_name.clone(),
            });
        }

        for source_name in table.fields.iter().flat_map(|e| e.raw_names()).duplicates() {
            violations.push(Violation::DuplicateSourceName {
                source_id: source_id.clone(),
                source_name: source_name.to_string(),
            });
        }

        violations
    }

    pub fn suggest(&self, raw: &str, field_type: FieldType) -> String {
        let snake = raw.to_snake_case();
        let mut name: String = snake
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
            .collect();
        name = name.trim_matches('_').to_string();
        if name.is_empty() {
            name = field_type.as_str().to_string();
        }
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            name = format!("f_{name}");
        }
        if let Some(suffix) = field_type.naming_suffix()
            && !field_type.has_conventional_suffix(&name)
            && name != suffix.trim_start_matches('_')
        {
            name.push_str(suffix);
        }
        if self.reserved.contains(&name) {
            name.push_str("_field");
        }
        name.truncate(self.max_len);
        name
    }

    pub fn hints(&self, table: &MappingTable) -> Vec<NamingHint> {
        table
            .fields
            .iter()
            .filter_map(|entry| {
                entry.field_type.naming_suffix()?;
                if entry.field_type.has_conventional_suffix(&entry.canonical_name) {
                    return None;
                }
                Some(NamingHint {
                    source_id: table.source.clone(),
                    canonical_name: entry.canonical_name.clone(),
                    field_type: entry.field_type,
                    suggestion: self.suggest(&entry.canonical_name, entry.field_type),
                })
            })
            .collect()
    }
}

fn check_cross_source(tables: &[&MappingTable]) -> Vec<Violation> {
    let mut first_seen: BTreeMap<(&str, &str), (&str, FieldType)> = BTreeMap::new();
    let mut reported: HashSet<(&str, &str, &str)> = HashSet::new();
    let mut violations = Vec::new();

    for table in tables {
        let Some(dataset) = table.dataset.as_deref() else {
            continue;
        };
        for entry in &table.fields {
            let key = (dataset, entry.canonical_name.as_str());
            match first_seen.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert((table.source.as_str(), entry.field_type));
                }
                Entry::Occupied(seen) => {
                    let (first_source, first_type) = *seen.get();
                    if first_type.is_compatible_with(entry.field_type)
                        || !reported.insert((
                            dataset,
                            entry.canonical_name.as_str(),
                            table.source.as_str(),
                        ))
                    {
                        continue;
                    }
                    violations.push(Violation::IncompatibleTypes {
                        dataset: dataset.to_string(),
                        canonical_name: entry.canonical_name.clone(),
                        first: (first_source.to_string(), first_type),
                        second: (table.source.clone(), entry.field_type),
                    });
                }
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FieldMapping;

    #[test]
    fn validate_applies_pattern_length_and_reserved_words() {
        let rules = NamingRules::standard();
        assert!(rules.validate("pct_change"));
        assert!(rules.validate("main_net_inflow"));
        assert!(!rules.validate("PctChange"));
        assert!(!rules.validate("1st_rank"));
        assert!(!rules.validate("涨跌幅"));
        assert!(!rules.validate("index"));
        assert!(!rules.validate(&"a".repeat(MAX_NAME_LEN + 1)));
        assert!(rules.validate(&"a".repeat(MAX_NAME_LEN)));
        assert_eq!(rules.check(""), Err(NameProblem::Empty));
    }

    #[test]
    fn duplicate_canonical_names_are_reported() {
        let table = MappingTable::new(
            "eastmoney_realtime",
            vec![
                FieldMapping::new("最新价", "close", FieldType::Value),
                FieldMapping::new("收盘", "close", FieldType::Value),
            ],
        );
        let violations = NamingRules::standard().check_table(&table);
        assert_eq!(
            violations,
            vec![Violation::DuplicateCanonical {
                source_id: "eastmoney_realtime".to_string(),
                canonical_name: "close".to_string(),
            }]
        );
    }

    #[test]
    fn alias_colliding_with_source_name_is_reported() {
        let table = MappingTable::new(
            "sina_realtime",
            vec![
                FieldMapping::new("涨跌幅", "pct_change", FieldType::Ratio),
                FieldMapping::new("涨跌额", "change", FieldType::NetFlow)
                    .with_aliases(["涨跌幅"]),
            ],
        );
        let violations = NamingRules::standard().check_table(&table);
        assert!(matches!(
            violations.as_slice(),
            [Violation::DuplicateSourceName { source_name, .. }] if source_name == "涨跌幅"
        ));
    }

    #[test]
    fn unit_outside_dimension_is_reported() {
        let table = MappingTable::new(
            "eastmoney_fundflow",
            vec![FieldMapping::new("代码", "symbol", FieldType::Symbol).with_unit(Unit::Yuan)],
        );
        let violations = NamingRules::standard().check_table(&table);
        assert!(matches!(violations[0], Violation::UnitDimension { .. }));
    }

    #[test]
    fn suggestion_adds_conventional_suffix() {
        let rules = NamingRules::standard();
        assert_eq!(rules.suggest("MarginBalance", FieldType::Balance), "margin_balance");
        assert_eq!(rules.suggest("holdings", FieldType::Ratio), "holdings_ratio");
        assert_eq!(rules.suggest("涨跌幅", FieldType::Rate), "rate");
        assert_eq!(rules.suggest("Type", FieldType::Name), "type_field");
    }
}
