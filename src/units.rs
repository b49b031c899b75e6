//! Unit model and numeric conversion.
//!
//! Every [`Unit`] belongs to a [`Dimension`] and carries an exact
//! numerator/denominator factor relative to that dimension's base unit.
//! Conversions never leave a dimension and never emit NaN or infinity:
//! anything that is not finite after scaling becomes `None`, which the
//! standardizer renders as JSON `null`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::{ConfigError, ConversionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    Currency,
    Ratio,
    Quantity,
}

impl Dimension {
    pub fn base(self) -> Unit {
        match self {
            Dimension::Currency => Unit::Yuan,
            Dimension::Ratio => Unit::Fraction,
            Dimension::Quantity => Unit::Share,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Currency => "currency",
            Dimension::Ratio => "ratio",
            Dimension::Quantity => "quantity",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {
    Yuan,
    WanYuan,
    YiYuan,
    Fraction,
    Percent,
    Share,
    Lot,
    WanShare,
    YiShare,
}

impl Unit {
    pub const ALL: [Unit; 9] = [
        Unit::Yuan,
        Unit::WanYuan,
        Unit::YiYuan,
        Unit::Fraction,
        Unit::Percent,
        Unit::Share,
        Unit::Lot,
        Unit::WanShare,
        Unit::YiShare,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Yuan => "yuan",
            Unit::WanYuan => "wan_yuan",
            Unit::YiYuan => "yi_yuan",
            Unit::Fraction => "fraction",
            Unit::Percent => "percent",
            Unit::Share => "share",
            Unit::Lot => "lot",
            Unit::WanShare => "wan_share",
            Unit::YiShare => "yi_share",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Unit::Yuan => "元",
            Unit::WanYuan => "万元",
            Unit::YiYuan => "亿元",
            Unit::Fraction => "比例",
            Unit::Percent => "%",
            Unit::Share => "股",
            Unit::Lot => "手",
            Unit::WanShare => "万股",
            Unit::YiShare => "亿股",
        }
    }

    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Yuan | Unit::WanYuan | Unit::YiYuan => Dimension::Currency,
            Unit::Fraction | Unit::Percent => Dimension::Ratio,
            Unit::Share | Unit::Lot | Unit::WanShare | Unit::YiShare => Dimension::Quantity,
        }
    }

    pub fn is_base(self) -> bool {
        self.dimension().base() == self
    }

    fn factor(self) -> (f64, f64) {
        match self {
            Unit::Yuan | Unit::Fraction | Unit::Share => (1.0, 1.0),
            Unit::WanYuan | Unit::WanShare => (1e4, 1.0),
            Unit::YiYuan | Unit::YiShare => (1e8, 1.0),
            Unit::Percent => (1.0, 100.0),
            Unit::Lot => (100.0, 1.0),
        }
    }

    pub fn scale(self) -> f64 {
        let (numerator, denominator) = self.factor();
        numerator / denominator
    }

    pub fn variants() -> Vec<&'static str> {
        Unit::ALL.iter().map(|unit| unit.as_str()).collect()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "yuan" | "元" | "cny" => Ok(Unit::Yuan),
            "wan_yuan" | "万元" | "wan" => Ok(Unit::WanYuan),
            "yi_yuan" | "亿元" | "yi" => Ok(Unit::YiYuan),
            "fraction" | "decimal" | "比例" => Ok(Unit::Fraction),
            "percent" | "pct" | "%" | "百分比" => Ok(Unit::Percent),
            "share" | "shares" | "股" => Ok(Unit::Share),
            "lot" | "lots" | "手" => Ok(Unit::Lot),
            "wan_share" | "wan_shares" | "万股" => Ok(Unit::WanShare),
            "yi_share" | "yi_shares" | "亿股" => Ok(Unit::YiShare),
            _ => Err(ConfigError::UnknownUnit {
                value: value.to_string(),
                supported: Unit::variants().join(", "),
            }),
        }
    }
}

impl Serialize for Unit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        Unit::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn scale_between(value: f64, from: Unit, to: Unit) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    if from == to {
        return Some(value);
    }
    let (from_num, from_den) = from.factor();
    let (to_num, to_den) = to.factor();
    // Factors are integral, so the folded ratio is exact in either direction.
    let numerator = from_num * to_den;
    let denominator = from_den * to_num;
    if numerator >= denominator {
        finite(value * (numerator / denominator))
    } else {
        finite(value / (denominator / numerator))
    }
}

/// Converts `value` from `from` into `to`.
///
/// `None` in, `None` out. Non-finite inputs and results that overflow
/// also map to `None`. Units from different dimensions are rejected.
pub fn convert(value: Option<f64>, from: Unit, to: Unit) -> Result<Option<f64>, ConversionError> {
    if from.dimension() != to.dimension() {
        return Err(ConversionError::DimensionMismatch { from, to });
    }
    Ok(value.and_then(|v| scale_between(v, from, to)))
}

pub fn to_base(value: Option<f64>, unit: Unit) -> Option<f64> {
    value.and_then(|v| scale_between(v, unit, unit.dimension().base()))
}

pub fn convert_column(values: &[Option<f64>], unit: Unit) -> Vec<Option<f64>> {
    let base = unit.dimension().base();
    values
        .iter()
        .map(|value| value.and_then(|v| scale_between(v, unit, base)))
        .collect()
}

pub fn convert_column_to(
    values: &[Option<f64>],
    from: Unit,
    to: Unit,
) -> Result<Vec<Option<f64>>, ConversionError> {
    if from.dimension() != to.dimension() {
        return Err(ConversionError::DimensionMismatch { from, to });
    }
    Ok(values
        .iter()
        .map(|value| value.and_then(|v| scale_between(v, from, to)))
        .collect())
}
