use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    error::ConfigError,
    units::{Dimension, Unit},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Numeric,
    Text,
    Date,
    Time,
    Timestamp,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            ValueKind::Numeric => "numeric",
            ValueKind::Text => "text",
            ValueKind::Date => "date",
            ValueKind::Time => "time",
            ValueKind::Timestamp => "timestamp",
        };
        f.write_str(token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FieldContract {
    pub expected_kind: ValueKind,
    pub allow_negative: bool,
    pub allow_null: bool,
    pub integral: bool,
}

impl FieldContract {
    const fn numeric(allow_negative: bool) -> Self {
        Self {
            expected_kind: ValueKind::Numeric,
            allow_negative,
            allow_null: true,
            integral: false,
        }
    }

    const fn counter() -> Self {
        Self {
            expected_kind: ValueKind::Numeric,
            allow_negative: false,
            allow_null: true,
            integral: true,
        }
    }

    const fn text(allow_null: bool) -> Self {
        Self {
            expected_kind: ValueKind::Text,
            allow_negative: false,
            allow_null,
            integral: false,
        }
    }

    const fn date(allow_null: bool) -> Self {
        Self::temporal(ValueKind::Date, allow_null)
    }

    const fn temporal(expected_kind: ValueKind, allow_null: bool) -> Self {
        Self {
            expected_kind,
            allow_negative: false,
            allow_null,
            integral: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldType {
    Date,
    Timestamp,
    EventDate,
    Time,
    Duration,
    Amount,
    NetFlow,
    Balance,
    Value,
    Rate,
    Ratio,
    Symbol,
    Name,
    Code,
    Market,
    Type,
    Rank,
    Count,
    Volume,
    Shares,
}

impl FieldType {
    pub const ALL: [FieldType; 20] = [
        FieldType::Date,
        FieldType::Timestamp,
        FieldType::EventDate,
        FieldType::Time,
        FieldType::Duration,
        FieldType::Amount,
        FieldType::NetFlow,
        FieldType::Balance,
        FieldType::Value,
        FieldType::Rate,
        FieldType::Ratio,
        FieldType::Symbol,
        FieldType::Name,
        FieldType::Code,
        FieldType::Market,
        FieldType::Type,
        FieldType::Rank,
        FieldType::Count,
        FieldType::Volume,
        FieldType::Shares,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Date => "date",
            FieldType::Timestamp => "timestamp",
            FieldType::EventDate => "event_date",
            FieldType::Time => "time",
            FieldType::Duration => "duration",
            FieldType::Amount => "amount",
            FieldType::NetFlow => "net_flow",
            FieldType::Balance => "balance",
            FieldType::Value => "value",
            FieldType::Rate => "rate",
            FieldType::Ratio => "ratio",
            FieldType::Symbol => "symbol",
            FieldType::Name => "name",
            FieldType::Code => "code",
            FieldType::Market => "market",
            FieldType::Type => "type",
            FieldType::Rank => "rank",
            FieldType::Count => "count",
            FieldType::Volume => "volume",
            FieldType::Shares => "shares",
        }
    }

    pub fn variants() -> Vec<&'static str> {
        FieldType::ALL.iter().map(|ty| ty.as_str()).collect()
    }

    pub const fn describe(self) -> FieldContract {
        match self {
            FieldType::Date => FieldContract::date(false),
            FieldType::EventDate => FieldContract::date(true),
            FieldType::Timestamp => FieldContract::temporal(ValueKind::Timestamp, true),
            FieldType::Time => FieldContract::temporal(ValueKind::Time, true),
            FieldType::Duration => FieldContract::numeric(false),
            FieldType::Amount | FieldType::Balance | FieldType::Value | FieldType::Volume => {
                FieldContract::numeric(false)
            }
            FieldType::Shares => FieldContract::numeric(false),
            FieldType::NetFlow | FieldType::Rate | FieldType::Ratio => {
                FieldContract::numeric(true)
            }
            FieldType::Symbol => FieldContract::text(false),
            FieldType::Name | FieldType::Code | FieldType::Market | FieldType::Type => {
                FieldContract::text(true)
            }
            FieldType::Rank | FieldType::Count => FieldContract::counter(),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FieldType::Date => "main date of the row (YYYY-MM-DD)",
            FieldType::Timestamp => "point in time, with an offset when the provider gives one",
            FieldType::EventDate => "event-specific date such as a report or notice date",
            FieldType::Time => "time of day (HH:MM:SS)",
            FieldType::Duration => "time span in days",
            FieldType::Amount => "transaction amount",
            FieldType::NetFlow => "signed net flow of funds",
            FieldType::Balance => "balance or outstanding amount",
            FieldType::Value => "market value or valuation",
            FieldType::Rate => "signed change rate",
            FieldType::Ratio => "ratio or proportion",
            FieldType::Symbol => "security code",
            FieldType::Name => "display name",
            FieldType::Code => "sector, industry, or concept code",
            FieldType::Market => "market or exchange identifier",
            FieldType::Type => "type or category label",
            FieldType::Rank => "ranking position",
            FieldType::Count => "count of items",
            FieldType::Volume => "trading volume",
            FieldType::Shares => "number of shares",
        }
    }

    pub fn dimension(self) -> Option<Dimension> {
        match self {
            FieldType::Amount | FieldType::NetFlow | FieldType::Balance | FieldType::Value => {
                Some(Dimension::Currency)
            }
            FieldType::Rate | FieldType::Ratio => Some(Dimension::Ratio),
            FieldType::Shares | FieldType::Volume => Some(Dimension::Quantity),
            _ => None,
        }
    }

    pub fn accepts_unit(self, unit: Unit) -> bool {
        self.dimension() == Some(unit.dimension())
    }

    pub fn naming_suffix(self) -> Option<&'static str> {
        match self {
            FieldType::EventDate => Some("_date"),
            FieldType::Time => Some("_time"),
            FieldType::Duration => Some("_days"),
            FieldType::Amount => Some("_amount"),
            FieldType::Balance => Some("_balance"),
            FieldType::Value => Some("_value"),
            FieldType::Rate => Some("_rate"),
            FieldType::Ratio => Some("_ratio"),
            FieldType::Code => Some("_code"),
            FieldType::Type => Some("_type"),
            FieldType::Count => Some("_count"),
            FieldType::Shares => Some("_shares"),
            _ => None,
        }
    }

    pub fn has_conventional_suffix(self, name: &str) -> bool {
        match self {
            FieldType::Duration => name.ends_with("_days") || name.ends_with("_duration"),
            _ => self
                .naming_suffix()
                .is_none_or(|suffix| name.ends_with(suffix)),
        }
    }

    pub fn is_compatible_with(self, other: FieldType) -> bool {
        self == other
            || (self.describe() == other.describe() && self.dimension() == other.dimension())
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        FieldType::ALL
            .iter()
            .copied()
            .find(|ty| ty.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownFieldType {
                value: value.to_string(),
                supported: FieldType::variants().join(", "),
            })
    }
}

impl Serialize for FieldType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        FieldType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upper_case_and_hyphenated_tags() {
        assert_eq!("DATE".parse::<FieldType>().unwrap(), FieldType::Date);
        assert_eq!("net-flow".parse::<FieldType>().unwrap(), FieldType::NetFlow);
        assert_eq!(" Ratio ".parse::<FieldType>().unwrap(), FieldType::Ratio);
    }

    #[test]
    fn unknown_tag_lists_supported_types() {
        let err = "percentage".parse::<FieldType>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("percentage"));
        assert!(message.contains("net_flow"));
    }

    #[test]
    fn sign_semantics_follow_category() {
        assert!(!FieldType::Amount.describe().allow_negative);
        assert!(FieldType::NetFlow.describe().allow_negative);
        assert!(FieldType::Ratio.describe().allow_negative);
        assert!(FieldType::Rank.describe().integral);
        assert!(!FieldType::Symbol.describe().allow_null);
    }

    #[test]
    fn units_must_match_dimension() {
        assert!(FieldType::Balance.accepts_unit(Unit::YiYuan));
        assert!(FieldType::Ratio.accepts_unit(Unit::Percent));
        assert!(FieldType::Volume.accepts_unit(Unit::Lot));
        assert!(!FieldType::Ratio.accepts_unit(Unit::WanYuan));
        assert!(!FieldType::Symbol.accepts_unit(Unit::Yuan));
    }

    #[test]
    fn compatibility_is_contract_based() {
        assert!(FieldType::Amount.is_compatible_with(FieldType::Balance));
        assert!(FieldType::Rate.is_compatible_with(FieldType::Ratio));
        assert!(!FieldType::Amount.is_compatible_with(FieldType::NetFlow));
        assert!(!FieldType::Symbol.is_compatible_with(FieldType::Name));
        assert!(!FieldType::Timestamp.is_compatible_with(FieldType::Date));
        assert!(!FieldType::Duration.is_compatible_with(FieldType::Amount));
    }

    #[test]
    fn time_categories_have_their_own_kinds() {
        assert_eq!(FieldType::Time.describe().expected_kind, ValueKind::Time);
        assert_eq!(
            FieldType::Timestamp.describe().expected_kind,
            ValueKind::Timestamp
        );
        assert!(!FieldType::Duration.describe().allow_negative);
        assert_eq!(FieldType::Duration.dimension(), None);
        assert!(FieldType::Duration.has_conventional_suffix("consecutive_days"));
        assert!(FieldType::Duration.has_conventional_suffix("suspension_duration"));
        assert!(!FieldType::Time.has_conventional_suffix("limit_up"));
        assert!(FieldType::Timestamp.has_conventional_suffix("timestamp"));
    }
}
