use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{io_utils::InputFormat, units::Unit};

pub const MAPPINGS_ENV: &str = "MARKET_FIELDS_MAPPINGS";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Standardize Chinese market data tables into canonical fields",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Standardize a raw provider table under its source's mapping document
    Standardize(StandardizeArgs),
    /// Check every mapping document in a directory for naming violations
    Lint(LintArgs),
    /// Convert a value between two units of the same dimension
    Convert(ConvertArgs),
    /// List canonical field types and the value contract of each
    Fields(FieldsArgs),
    /// List the sources defined in a mappings directory
    Sources(SourcesArgs),
}

#[derive(Debug, Args)]
pub struct StandardizeArgs {
    /// Raw CSV or JSON table to standardize ('-' reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Source id; selects the mapping document `<mappings>/<source>.yaml`
    #[arg(short = 's', long = "source")]
    pub source: String,
    /// Directory holding one mapping document per source
    #[arg(short = 'm', long = "mappings", env = MAPPINGS_ENV)]
    pub mappings: PathBuf,
    /// Output file (defaults to stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
    /// Write the validation report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Input format (defaults to the input file extension, CSV for stdin)
    #[arg(long = "input-format", value_enum)]
    pub input_format: Option<InputKind>,
    /// Character encoding of the input (defaults to utf-8; e.g. gbk)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Canonical columns to keep, in output order
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Canonical column to sort by (descending unless --ascending)
    #[arg(long = "sort-by")]
    pub sort_by: Option<String>,
    /// Sort ascending instead of descending
    #[arg(long, requires = "sort_by")]
    pub ascending: bool,
    /// Keep only the first N rows after sorting
    #[arg(long = "top")]
    pub top: Option<usize>,
    /// Fail when any value was coerced or any mapped column was missing
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct LintArgs {
    /// Directory holding one mapping document per source
    #[arg(short = 'm', long = "mappings", env = MAPPINGS_ENV)]
    pub mappings: PathBuf,
    /// Print the lint report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Value to convert; placeholders such as '-' print null
    #[arg(allow_hyphen_values = true)]
    pub value: String,
    /// Unit of the input value (e.g. 亿元, wan_yuan, percent, 手)
    #[arg(long, value_parser = parse_unit)]
    pub from: Unit,
    /// Target unit (defaults to the base unit of the input's dimension)
    #[arg(long, value_parser = parse_unit)]
    pub to: Option<Unit>,
}

#[derive(Debug, Args)]
pub struct FieldsArgs {
    /// Print the field registry as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SourcesArgs {
    /// Directory holding one mapping document per source
    #[arg(short = 'm', long = "mappings", env = MAPPINGS_ENV)]
    pub mappings: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputKind {
    Csv,
    Json,
}

impl From<InputKind> for InputFormat {
    fn from(kind: InputKind) -> Self {
        match kind {
            InputKind::Csv => InputFormat::Csv,
            InputKind::Json => InputFormat::Json,
        }
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_unit(value: &str) -> Result<Unit, String> {
    value.parse::<Unit>().map_err(|err| err.to_string())
}
