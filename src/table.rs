use std::{cmp::Ordering, collections::HashSet, io::Read};

use serde::{
    Serialize, Serializer,
    ser::{SerializeMap, SerializeSeq},
};

use crate::{
    error::RawTableError,
    field_type::FieldType,
    value::{Cell, RawValue},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<RawValue>>) -> Result<Self, RawTableError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(RawTableError::DuplicateColumn(column.clone()));
            }
        }
        if let Some((row, values)) = rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != columns.len())
        {
            return Err(RawTableError::RaggedRow {
                row,
                expected: columns.len(),
                found: values.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn from_records(records: &[RawValue]) -> Result<Self, RawTableError> {
        let mut columns: Vec<String> = Vec::new();
        let mut known: HashSet<String> = HashSet::new();
        for (row, record) in records.iter().enumerate() {
            let object = record
                .as_object()
                .ok_or(RawTableError::NotAnObject { row })?;
            for key in object.keys() {
                if known.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .filter_map(RawValue::as_object)
            .map(|object| {
                columns
                    .iter()
                    .map(|column| object.get(column).cloned().unwrap_or(RawValue::Null))
                    .collect()
            })
            .collect();
        Ok(Self { columns, rows })
    }

    /// Accepts either an array of record objects or an object of the form
    /// `{"columns": [...], "rows": [[...], ...]}`.
    pub fn from_json_str(input: &str) -> Result<Self, RawTableError> {
        let value: RawValue =
            serde_json::from_str(input).map_err(|err| RawTableError::InvalidJson(err.to_string()))?;
        match value {
            RawValue::Array(records) => Self::from_records(&records),
            RawValue::Object(mut object) => {
                let columns = match object.remove("columns") {
                    Some(RawValue::Array(names)) => names
                        .into_iter()
                        .map(|name| match name {
                            RawValue::String(text) => Ok(text),
                            _ => Err(RawTableError::UnsupportedShape),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => return Err(RawTableError::UnsupportedShape),
                };
                let rows = match object.remove("rows") {
                    Some(RawValue::Array(rows)) => rows
                        .into_iter()
                        .map(|row| match row {
                            RawValue::Array(values) => Ok(values),
                            _ => Err(RawTableError::UnsupportedShape),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    None => Vec::new(),
                    _ => return Err(RawTableError::UnsupportedShape),
                };
                Self::new(columns, rows)
            }
            _ => Err(RawTableError::UnsupportedShape),
        }
    }

    pub fn from_csv_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, RawTableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .double_quote(true)
            .flexible(true)
            .from_reader(reader);
        let columns: Vec<String> = csv_reader
            .headers()
            .map_err(|err| RawTableError::Csv(err.to_string()))?
            .iter()
            .map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|err| RawTableError::Csv(err.to_string()))?;
            rows.push(
                record
                    .iter()
                    .map(|field| RawValue::String(field.to_string()))
                    .collect(),
            );
        }
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<RawValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &RawValue> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub field_type: FieldType,
    pub values: Vec<Cell>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardizedTable {
    columns: Vec<Column>,
    row_count: usize,
}

impl StandardizedTable {
    pub(crate) fn new(columns: Vec<Column>, row_count: usize) -> Self {
        debug_assert!(columns.iter().all(|column| column.values.len() == row_count));
        Self { columns, row_count }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn row(&self, index: usize) -> Option<Vec<&Cell>> {
        (index < self.row_count).then(|| {
            self.columns
                .iter()
                .map(|column| &column.values[index])
                .collect()
        })
    }

    pub fn records(&self) -> Records<'_> {
        Records(self)
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.records())
    }

    pub fn to_json_string_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records())
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        writer.write_record(self.columns.iter().map(|column| column.name.as_str()))?;
        for row in 0..self.row_count {
            writer.write_record(
                self.columns
                    .iter()
                    .map(|column| column.values[row].as_display()),
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn select_columns(&mut self, names: &[String]) {
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            if selected.iter().any(|column: &Column| &column.name == name) {
                continue;
            }
            if let Some(position) = self.columns.iter().position(|column| &column.name == name) {
                selected.push(self.columns[position].clone());
            }
        }
        if !selected.is_empty() {
            self.columns = selected;
        }
    }

    /// Stable sort by one column; nulls always sort last. Returns `false`
    /// when the column does not exist.
    pub fn sort_by(&mut self, name: &str, ascending: bool) -> bool {
        let Some(key) = self.column(name) else {
            return false;
        };
        let mut order: Vec<usize> = (0..self.row_count).collect();
        order.sort_by(|&a, &b| compare_cells(&key.values[a], &key.values[b], ascending));
        for column in &mut self.columns {
            column.values = order.iter().map(|&row| column.values[row].clone()).collect();
        }
        true
    }

    pub fn truncate(&mut self, rows: usize) {
        if rows >= self.row_count {
            return;
        }
        for column in &mut self.columns {
            column.values.truncate(rows);
        }
        self.row_count = rows;
    }
}

fn compare_cells(left: &Cell, right: &Cell, ascending: bool) -> Ordering {
    let directed = |ordering: Ordering| if ascending { ordering } else { ordering.reverse() };
    match (left, right) {
        (Cell::Null, Cell::Null) => Ordering::Equal,
        (Cell::Null, _) => Ordering::Greater,
        (_, Cell::Null) => Ordering::Less,
        (Cell::Number(a), Cell::Number(b)) => directed(a.total_cmp(b)),
        (Cell::Text(a), Cell::Text(b)) => directed(a.cmp(b)),
        (Cell::Number(_), Cell::Text(_)) => directed(Ordering::Less),
        (Cell::Text(_), Cell::Number(_)) => directed(Ordering::Greater),
    }
}

pub struct Records<'a>(&'a StandardizedTable);

struct RecordRef<'a> {
    table: &'a StandardizedTable,
    row: usize,
}

impl Serialize for Records<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.0.row_count))?;
        for row in 0..self.0.row_count {
            seq.serialize_element(&RecordRef {
                table: self.0,
                row,
            })?;
        }
        seq.end()
    }
}

impl Serialize for RecordRef<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.table.columns.len()))?;
        for column in &self.table.columns {
            map.serialize_entry(&column.name, &column.values[self.row])?;
        }
        map.end()
    }
}
