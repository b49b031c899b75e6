//! Input decoding, raw table loading, and output stream helpers.
//!
//! Inputs may be files or stdin (`-`) in any encoding `encoding_rs` knows;
//! they are transcoded to UTF-8 before parsing. Outputs are UTF-8.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::table::RawTable;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => InputFormat::Json,
            _ => InputFormat::Csv,
        }
    }
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_decoded_input(path: &Path, encoding: &'static Encoding) -> Result<Box<dyn Read>> {
    let source: Box<dyn Read> = if is_dash(path) {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    let decoded = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .build(source);
    Ok(Box::new(decoded))
}

pub fn read_raw_table(
    path: &Path,
    encoding: &'static Encoding,
    format: Option<InputFormat>,
    delimiter: Option<u8>,
) -> Result<RawTable> {
    let format = format.unwrap_or_else(|| InputFormat::from_path(path));
    let mut reader = open_decoded_input(path, encoding)?;
    let table = match format {
        InputFormat::Json => {
            let mut text = String::new();
            reader
                .read_to_string(&mut text)
                .with_context(|| format!("Reading {path:?} as {}", encoding.name()))?;
            RawTable::from_json_str(&text)
        }
        InputFormat::Csv => {
            RawTable::from_csv_reader(reader, resolve_input_delimiter(path, delimiter))
        }
    };
    table.with_context(|| format!("Parsing raw table from {path:?}"))
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) if !is_dash(p) => Ok(Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        ))),
        _ => Ok(Box::new(io::stdout())),
    }
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer = open_output(path)?;
    Ok(csv::WriterBuilder::new()
        .delimiter(delimiter)
        .double_quote(true)
        .from_writer(writer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn gbk_csv_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quote.csv");
        let (bytes, _, _) = encoding_rs::GBK.encode("代码,名称\n600000,浦发银行\n");
        fs::write(&path, bytes.as_ref()).unwrap();
        let encoding = resolve_encoding(Some("gbk")).unwrap();
        let table = read_raw_table(&path, encoding, None, None).unwrap();
        assert_eq!(table.columns(), &["代码".to_string(), "名称".to_string()]);
        assert_eq!(table.rows()[0][1], serde_json::json!("浦发银行"));
    }

    #[test]
    fn format_and_delimiter_follow_extension() {
        assert_eq!(InputFormat::from_path(Path::new("a.JSON")), InputFormat::Json);
        assert_eq!(InputFormat::from_path(Path::new("-")), InputFormat::Csv);
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), Some(b';')), b';');
    }

    #[test]
    fn unknown_encoding_is_an_error() {
        assert!(resolve_encoding(Some("klingon")).is_err());
    }
}
