pub mod cache;
pub mod cli;
pub mod document;
pub mod error;
pub mod field_type;
pub mod io_utils;
mod lint;
pub mod mapping;
pub mod naming;
pub mod provider;
pub mod render;
pub mod report;
pub mod standardize;
mod standardize_cmd;
pub mod table;
pub mod units;
pub mod value;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};
use serde::Serialize;

pub use crate::{
    error::{ConfigError, ConversionError, RawTableError},
    field_type::{FieldContract, FieldType, ValueKind},
    mapping::{FieldMapping, MappingRegistry, MappingTable},
    naming::{NamingRules, Violation},
    report::{CoercionReason, SchemaDriftNotice, ValidationReport, ValueCoercion},
    standardize::FieldStandardizer,
    table::{RawTable, StandardizedTable},
    units::{Dimension, Unit},
    value::Cell,
};

use crate::{
    cli::{Cli, Commands, ConvertArgs, FieldsArgs, SourcesArgs},
    value::parse_number_token,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("market_fields", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Standardize(args) => standardize_cmd::execute(&args),
        Commands::Lint(args) => lint::execute(&args),
        Commands::Convert(args) => handle_convert(&args),
        Commands::Fields(args) => handle_fields(&args),
        Commands::Sources(args) => handle_sources(&args),
    }
}

fn handle_convert(args: &ConvertArgs) -> Result<()> {
    let value = match parse_number_token(&args.value) {
        Ok(cell) => cell.as_f64(),
        Err(reason) => anyhow::bail!("'{}': {}", args.value, reason.describe()),
    };
    let target = args.to.unwrap_or_else(|| args.from.dimension().base());
    let converted = units::convert(value, args.from, target)?;
    match converted {
        Some(number) => println!("{}", Cell::number(number)),
        None => println!("null"),
    }
    Ok(())
}

#[derive(Serialize)]
struct FieldTypeInfo {
    field_type: FieldType,
    #[serde(flatten)]
    contract: FieldContract,
    dimension: Option<&'static str>,
    naming_suffix: Option<&'static str>,
    description: &'static str,
}

fn handle_fields(args: &FieldsArgs) -> Result<()> {
    let infos = FieldType::ALL
        .iter()
        .map(|&field_type| FieldTypeInfo {
            field_type,
            contract: field_type.describe(),
            dimension: field_type.dimension().map(Dimension::as_str),
            naming_suffix: field_type.naming_suffix(),
            description: field_type.description(),
        })
        .collect::<Vec<_>>();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }
    let headers = [
        "field_type",
        "kind",
        "negative",
        "null",
        "integral",
        "dimension",
        "suffix",
        "description",
    ]
    .map(str::to_string)
    .to_vec();
    let flag = |value: bool| if value { "yes" } else { "no" }.to_string();
    let rows = infos
        .iter()
        .map(|info| {
            vec![
                info.field_type.to_string(),
                info.contract.expected_kind.to_string(),
                flag(info.contract.allow_negative),
                flag(info.contract.allow_null),
                flag(info.contract.integral),
                info.dimension.unwrap_or("-").to_string(),
                info.naming_suffix.unwrap_or("-").to_string(),
                info.description.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    print!("{}", render::render_table(&headers, &rows));
    Ok(())
}

fn handle_sources(args: &SourcesArgs) -> Result<()> {
    let registry = MappingRegistry::from_dir(&args.mappings);
    let sources = registry
        .sources()
        .with_context(|| format!("Listing mapping documents in {:?}", args.mappings))?;
    let headers = ["source", "dataset", "version", "fields", "status"]
        .map(str::to_string)
        .to_vec();
    let mut rows = Vec::with_capacity(sources.len());
    for source in &sources {
        let row = match registry.resolve(source) {
            Ok(table) => vec![
                table.source.clone(),
                table.dataset.clone().unwrap_or_else(|| "-".to_string()),
                table.version.clone().unwrap_or_else(|| "-".to_string()),
                table.fields.len().to_string(),
                "ok".to_string(),
            ],
            Err(err) => vec![
                source.clone(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                err.to_string(),
            ],
        };
        rows.push(row);
    }
    print!("{}", render::render_table(&headers, &rows));
    info!("{} source(s) in {:?}", sources.len(), args.mappings);
    Ok(())
}
