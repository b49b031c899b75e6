use std::{fs::File, io::BufWriter, path::Path};

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::Serialize;

use crate::{mapping::FieldMapping, value::RawValue};

const RAW_PREVIEW_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionReason {
    NotNumeric,
    NotText,
    InvalidDate,
    InvalidTime,
    Negative,
    NotIntegral,
    MissingRequired,
    NonFinite,
}

impl CoercionReason {
    pub fn describe(self) -> &'static str {
        match self {
            CoercionReason::NotNumeric => "value is not numeric",
            CoercionReason::NotText => "value is not text",
            CoercionReason::InvalidDate => "value is not a recognizable date",
            CoercionReason::InvalidTime => "value is not a recognizable time or timestamp",
            CoercionReason::Negative => "negative value in a non-negative field",
            CoercionReason::NotIntegral => "fractional value in an integral field",
            CoercionReason::MissingRequired => "null value in a required field",
            CoercionReason::NonFinite => "value is not finite",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCoercion {
    pub row: usize,
    pub field: String,
    pub raw: String,
    pub reason: CoercionReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDriftNotice {
    pub canonical_name: String,
    pub source_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub source: String,
    pub rows_coerced: usize,
    pub fields_dropped: Vec<String>,
    pub unmapped_columns: Vec<String>,
    pub coercions: Vec<ValueCoercion>,
    pub drift: Vec<SchemaDriftNotice>,
}

impl ValidationReport {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.coercions.is_empty() && self.drift.is_empty()
    }

    pub(crate) fn record_coercion(
        &mut self,
        row: usize,
        field: &str,
        raw: &RawValue,
        reason: CoercionReason,
    ) {
        self.coercions.push(ValueCoercion {
            row,
            field: field.to_string(),
            raw: preview_raw(raw),
            reason,
        });
    }

    pub(crate) fn record_drift(&mut self, entry: &FieldMapping) {
        self.fields_dropped.push(entry.canonical_name.clone());
        self.drift.push(SchemaDriftNotice {
            canonical_name: entry.canonical_name.clone(),
            source_name: entry.source_name.clone(),
        });
    }

    pub(crate) fn record_unmapped(&mut self, column: &str) {
        self.unmapped_columns.push(column.to_string());
    }

    pub(crate) fn finish(&mut self) {
        self.rows_coerced = self.coercions.iter().map(|c| c.row).unique().count();
    }

    pub fn coercions_by_field(&self) -> Vec<(String, usize)> {
        self.coercions
            .iter()
            .map(|c| c.field.as_str())
            .counts()
            .into_iter()
            .map(|(field, count)| (field.to_string(), count))
            .sorted_by_key(|(field, _)| {
                self.coercions
                    .iter()
                    .position(|c| &c.field == field)
                    .unwrap_or(usize::MAX)
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating report file {path:?}"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).context("Writing report JSON")
    }
}

fn preview_raw(raw: &RawValue) -> String {
    let rendered = match raw {
        RawValue::String(text) => text.clone(),
        other => other.to_string(),
    };
    if rendered.chars().count() > RAW_PREVIEW_CHARS {
        let mut truncated: String = rendered.chars().take(RAW_PREVIEW_CHARS).collect();
        truncated.push('…');
        truncated
    } else {
        rendered
    }
}
