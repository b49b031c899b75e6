use std::path::PathBuf;

use thiserror::Error;

use crate::{naming::Violation, units::Unit};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown source '{0}'")]
    UnknownSource(String),

    #[error("Unknown field type '{value}'. Supported types: {supported}")]
    UnknownFieldType { value: String, supported: String },

    #[error("Unknown unit '{value}'. Supported units: {supported}")]
    UnknownUnit { value: String, supported: String },

    #[error("Malformed mapping document {path:?}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error(
        "Mapping for source '{source_id}' has {} naming violation(s): {}",
        .violations.len(),
        summarize(.violations)
    )]
    Naming {
        source_id: String,
        violations: Vec<Violation>,
    },

    #[error("Reading mapping document {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn violations(&self) -> &[Violation] {
        match self {
            ConfigError::Naming { violations, .. } => violations,
            _ => &[],
        }
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|violation| violation.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConversionError {
    #[error(
        "Cannot convert {from} ({}) into {to} ({})",
        .from.dimension(),
        .to.dimension()
    )]
    DimensionMismatch { from: Unit, to: Unit },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RawTableError {
    #[error("Row {row} has {found} value(s) but the table declares {expected} column(s)")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Raw column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("Record {row} is not a JSON object")]
    NotAnObject { row: usize },

    #[error("Expected a JSON array of records or an object with 'columns' and 'rows'")]
    UnsupportedShape,

    #[error("Invalid JSON input: {0}")]
    InvalidJson(String),

    #[error("Invalid CSV input: {0}")]
    Csv(String),
}
