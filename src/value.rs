use std::{fmt, sync::OnceLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::{
    field_type::{FieldContract, FieldType, ValueKind},
    report::CoercionReason,
};

pub type RawValue = serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Cell::Number(value)
        } else {
            Cell::Null
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Cell::Null
        } else {
            Cell::Text(value)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    format!("{value:.0}")
                } else {
                    value.to_string()
                }
            }
            Cell::Text(value) => value.clone(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl Serialize for Cell {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Cell::Null => serializer.serialize_none(),
            Cell::Number(value) if value.is_finite() => serializer.serialize_f64(*value),
            Cell::Number(_) => serializer.serialize_none(),
            Cell::Text(value) => serializer.serialize_str(value),
        }
    }
}

/// Tokens providers use for "no value". They become null, not coercions.
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    if trimmed.chars().all(|c| matches!(c, '-' | '—' | '－')) {
        return true;
    }
    let lowered = trimmed.to_ascii_lowercase();
    matches!(
        lowered.as_str(),
        "na" | "n/a" | "n.a." | "nan" | "nat" | "null" | "none" | "missing"
    )
}

/// Parses a provider cell against the contract of `field_type`.
///
/// Returns the standardized cell, or the reason the raw value violates the
/// contract. Unit scaling is applied later by the standardizer.
pub fn parse_cell(raw: &RawValue, field_type: FieldType) -> Result<Cell, CoercionReason> {
    let contract = field_type.describe();
    let cell = match contract.expected_kind {
        ValueKind::Numeric => parse_numeric(raw)?,
        ValueKind::Text => parse_text(raw, field_type)?,
        ValueKind::Date => parse_date(raw)?,
        ValueKind::Time => parse_time(raw)?,
        ValueKind::Timestamp => parse_timestamp(raw)?,
    };
    check_contract(cell, &contract)
}

fn check_contract(cell: Cell, contract: &FieldContract) -> Result<Cell, CoercionReason> {
    match cell {
        Cell::Null if !contract.allow_null => Err(CoercionReason::MissingRequired),
        Cell::Number(value) if value < 0.0 && !contract.allow_negative => {
            Err(CoercionReason::Negative)
        }
        Cell::Number(value) if contract.integral && value.fract() != 0.0 => {
            Err(CoercionReason::NotIntegral)
        }
        other => Ok(other),
    }
}

fn parse_numeric(raw: &RawValue) -> Result<Cell, CoercionReason> {
    match raw {
        RawValue::Null => Ok(Cell::Null),
        RawValue::Number(number) => number
            .as_f64()
            .filter(|value| value.is_finite())
            .map(Cell::Number)
            .ok_or(CoercionReason::NonFinite),
        RawValue::String(text) => parse_number_token(text),
        RawValue::Bool(_) | RawValue::Array(_) | RawValue::Object(_) => {
            Err(CoercionReason::NotNumeric)
        }
    }
}

pub fn parse_number_token(text: &str) -> Result<Cell, CoercionReason> {
    if is_placeholder(text) {
        return Ok(Cell::Null);
    }
    let cleaned: String = text
        .trim()
        .trim_end_matches(['%', '％'])
        .chars()
        .filter(|c| !matches!(c, ',' | '，' | ' ' | '_'))
        .collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    let parsed: f64 = cleaned.parse().map_err(|_| CoercionReason::NotNumeric)?;
    if parsed.is_finite() {
        Ok(Cell::Number(parsed))
    } else {
        Err(CoercionReason::NonFinite)
    }
}

fn parse_text(raw: &RawValue, field_type: FieldType) -> Result<Cell, CoercionReason> {
    let text = match raw {
        RawValue::Null => return Ok(Cell::Null),
        RawValue::String(text) => {
            if is_placeholder(text) {
                return Ok(Cell::Null);
            }
            text.trim().to_string()
        }
        RawValue::Number(number) => {
            whole_number_token(number).unwrap_or_else(|| number.to_string())
        }
        RawValue::Bool(flag) => flag.to_string(),
        RawValue::Array(_) | RawValue::Object(_) => return Err(CoercionReason::NotText),
    };
    if field_type == FieldType::Symbol {
        Ok(Cell::text(normalize_symbol(&text)))
    } else {
        Ok(Cell::text(text))
    }
}

/// Strips exchange prefixes or suffixes and left-pads numeric codes to six
/// digits: `sh600000`, `600000.SH` and `600000` all become `600000`.
pub fn normalize_symbol(raw: &str) -> String {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let mut core = trimmed;
    for prefix in ["sh", "sz", "bj"] {
        if let Some(rest) = lowered.strip_prefix(prefix)
            && !rest.is_empty()
            && rest.chars().all(|c| c.is_ascii_digit())
        {
            core = &trimmed[prefix.len()..];
            break;
        }
    }
    for suffix in [".sh", ".ss", ".sz", ".bj"] {
        if lowered.ends_with(suffix) && trimmed.len() > suffix.len() {
            let head = &trimmed[..trimmed.len() - suffix.len()];
            if head.chars().all(|c| c.is_ascii_digit()) {
                core = head;
                break;
            }
        }
    }
    if !core.is_empty() && core.len() < 6 && core.chars().all(|c| c.is_ascii_digit()) {
        format!("{core:0>6}")
    } else {
        core.to_string()
    }
}

fn chinese_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})年(\d{1,2})月(\d{1,2})日").expect("chinese date pattern compiles")
    })
}

fn parse_date(raw: &RawValue) -> Result<Cell, CoercionReason> {
    let date = match raw {
        RawValue::Null => return Ok(Cell::Null),
        RawValue::String(text) => {
            if is_placeholder(text) {
                return Ok(Cell::Null);
            }
            parse_date_token(text.trim())
        }
        RawValue::Number(number) => {
            whole_number_token(number).and_then(|digits| parse_compact_date(&digits))
        }
        _ => None,
    };
    date.map(|d| Cell::Text(d.format("%Y-%m-%d").to_string()))
        .ok_or(CoercionReason::InvalidDate)
}

fn whole_number_token(number: &serde_json::Number) -> Option<String> {
    if let Some(unsigned) = number.as_u64() {
        return Some(unsigned.to_string());
    }
    if let Some(signed) = number.as_i64() {
        return Some(signed.to_string());
    }
    number
        .as_f64()
        .filter(|value| value.fract() == 0.0 && value.abs() < 1e15)
        .map(|value| format!("{value:.0}"))
}

fn parse_time(raw: &RawValue) -> Result<Cell, CoercionReason> {
    let time = match raw {
        RawValue::Null => return Ok(Cell::Null),
        RawValue::String(text) => {
            if is_placeholder(text) {
                return Ok(Cell::Null);
            }
            parse_time_token(text.trim())
        }
        RawValue::Number(number) => {
            whole_number_token(number).and_then(|digits| parse_compact_time(&digits))
        }
        _ => None,
    };
    time.map(|t| Cell::Text(t.format("%H:%M:%S").to_string()))
        .ok_or(CoercionReason::InvalidTime)
}

fn parse_compact_time(value: &str) -> Option<NaiveTime> {
    if !(5..=6).contains(&value.len()) || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveTime::parse_from_str(&format!("{value:0>6}"), "%H%M%S").ok()
}

pub fn parse_time_token(value: &str) -> Option<NaiveTime> {
    const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M:%S%.f", "%H:%M"];
    if let Some(time) = parse_compact_time(value) {
        return Some(time);
    }
    for fmt in TIME_FORMATS {
        if let Ok(parsed) = NaiveTime::parse_from_str(value, fmt) {
            return Some(parsed);
        }
    }
    parse_datetime_token(value).map(|parsed| parsed.time())
}

fn parse_timestamp(raw: &RawValue) -> Result<Cell, CoercionReason> {
    let rendered = match raw {
        RawValue::Null => return Ok(Cell::Null),
        RawValue::String(text) => {
            if is_placeholder(text) {
                return Ok(Cell::Null);
            }
            parse_timestamp_token(text.trim())
        }
        RawValue::Number(number) => whole_number_token(number)
            .and_then(|digits| digits.parse::<i64>().ok())
            .and_then(epoch_timestamp)
            .map(|parsed| parsed.format("%Y-%m-%dT%H:%M:%S%:z").to_string()),
        _ => None,
    };
    rendered.map(Cell::Text).ok_or(CoercionReason::InvalidTime)
}

fn epoch_timestamp(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

/// Offset-bearing input keeps its offset (`2024-01-05T09:30:00+08:00`);
/// naive input is rendered as `2024-01-05 09:30:00`.
pub fn parse_timestamp_token(value: &str) -> Option<String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.format("%Y-%m-%dT%H:%M:%S%:z").to_string());
    }
    if value.len() >= 10 && value.chars().all(|c| c.is_ascii_digit()) {
        let epoch = value.parse::<i64>().ok().and_then(epoch_timestamp)?;
        return Some(epoch.format("%Y-%m-%dT%H:%M:%S%:z").to_string());
    }
    let naive = parse_datetime_token(value).or_else(|| {
        parse_date_token(value).and_then(|date| date.and_hms_opt(0, 0, 0))
    })?;
    Some(naive.format("%Y-%m-%d %H:%M:%S").to_string())
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

fn parse_datetime_token(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

fn parse_compact_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year = value[0..4].parse().ok()?;
    let month = value[4..6].parse().ok()?;
    let day = value[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn parse_date_token(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];
    if let Some(date) = parse_compact_date(value) {
        return Some(date);
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Some(parsed);
        }
    }
    if let Some(parsed) = parse_datetime_token(value) {
        return Some(parsed.date());
    }
    let captures = chinese_date_pattern().captures(value)?;
    let year = captures[1].parse().ok()?;
    let month = captures[2].parse().ok()?;
    let day = captures[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
