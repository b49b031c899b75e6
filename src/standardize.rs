//! Reconciles a raw provider table with its source's mapping table.
//!
//! One linear pass over the mapping entries binds each to a raw column (by
//! source name, then aliases). Bound columns are parsed against their
//! field contract and scaled into the base unit of their dimension; entries
//! without a raw column are reported as drift and omitted. Raw columns no
//! entry claims are ignored.

use std::{path::PathBuf, sync::Arc};

use log::{debug, info, warn};

use crate::{
    error::ConfigError,
    mapping::{FieldMapping, MappingRegistry, MappingTable},
    report::{CoercionReason, ValidationReport},
    table::{Column, RawTable, StandardizedTable},
    units,
    value::{Cell, parse_cell},
};

#[derive(Debug, Clone)]
pub struct FieldStandardizer {
    registry: Arc<MappingRegistry>,
}

impl FieldStandardizer {
    pub fn new(registry: Arc<MappingRegistry>) -> Self {
        Self { registry }
    }

    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(MappingRegistry::from_dir(root)))
    }

    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.registry
    }

    /// Standardizes `raw` under the mapping registered for `source_id`.
    ///
    /// Only configuration problems fail the call. Value-level problems and
    /// schema drift are returned in the report.
    pub fn standardize(
        &self,
        raw: &RawTable,
        source_id: &str,
    ) -> Result<(StandardizedTable, ValidationReport), ConfigError> {
        let mapping = self.registry.resolve(source_id)?;
        Ok(standardize_with(&mapping, raw))
    }
}

pub fn standardize_with(
    mapping: &MappingTable,
    raw: &RawTable,
) -> (StandardizedTable, ValidationReport) {
    let mut report = ValidationReport::new(&mapping.source);
    let mut claimed = vec![false; raw.columns().len()];
    let mut bound: Vec<(&FieldMapping, usize)> = Vec::with_capacity(mapping.fields.len());

    for entry in &mapping.fields {
        match entry
            .raw_names()
            .find_map(|name| raw.column_index(name).filter(|&index| !claimed[index]))
        {
            Some(index) => {
                claimed[index] = true;
                debug!(
                    "[{}] '{}' -> '{}'",
                    mapping.source,
                    raw.columns()[index],
                    entry.canonical_name
                );
                bound.push((entry, index));
            }
            None => {
                warn!(
                    "[{}] Raw column '{}' is missing; dropping '{}'",
                    mapping.source, entry.source_name, entry.canonical_name
                );
                report.record_drift(entry);
            }
        }
    }

    for (index, column) in raw.columns().iter().enumerate() {
        if !claimed[index] {
            debug!("[{}] Ignoring unmapped column '{column}'", mapping.source);
            report.record_unmapped(column);
        }
    }

    let table = if bound.is_empty() {
        warn!(
            "[{}] No raw column matched the mapping; returning {} empty column(s)",
            mapping.source,
            mapping.fields.len()
        );
        let columns = mapping
            .fields
            .iter()
            .map(|entry| Column {
                name: entry.canonical_name.clone(),
                field_type: entry.field_type,
                values: Vec::new(),
            })
            .collect();
        StandardizedTable::new(columns, 0)
    } else {
        let columns = bound
            .into_iter()
            .map(|(entry, index)| standardize_column(entry, raw, index, &mut report))
            .collect();
        StandardizedTable::new(columns, raw.row_count())
    };

    report.finish();
    if !report.coercions.is_empty() {
        warn!(
            "[{}] {} value(s) in {} row(s) replaced with null",
            mapping.source,
            report.coercions.len(),
            report.rows_coerced
        );
    }
    info!(
        "[{}] Standardized {} row(s) into {} column(s)",
        mapping.source,
        table.row_count(),
        table.columns().len()
    );
    (table, report)
}

fn standardize_column(
    entry: &FieldMapping,
    raw: &RawTable,
    index: usize,
    report: &mut ValidationReport,
) -> Column {
    let mut values: Vec<Cell> = raw
        .column_values(index)
        .enumerate()
        .map(|(row, value)| {
            parse_cell(value, entry.field_type).unwrap_or_else(|reason| {
                report.record_coercion(row, &entry.canonical_name, value, reason);
                Cell::Null
            })
        })
        .collect();

    if let Some(unit) = entry.conversion_unit() {
        let numbers: Vec<Option<f64>> = values.iter().map(Cell::as_f64).collect();
        let scaled = units::convert_column(&numbers, unit);
        for (row, (cell, converted)) in values.iter_mut().zip(scaled).enumerate() {
            if !matches!(cell, Cell::Number(_)) {
                continue;
            }
            match converted {
                Some(value) => *cell = Cell::Number(value),
                None => {
                    report.record_coercion(
                        row,
                        &entry.canonical_name,
                        &raw.rows()[row][index],
                        CoercionReason::NonFinite,
                    );
                    *cell = Cell::Null;
                }
            }
        }
    }

    Column {
        name: entry.canonical_name.clone(),
        field_type: entry.field_type,
        values,
    }
}
