use std::{io::Write, sync::Arc};

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};

use crate::{
    cache::{self, DEFAULT_TTL},
    cli::{OutputFormat, StandardizeArgs},
    io_utils,
    provider::{DataFilter, FetchRequest, ProviderRegistry, StandardizedFetch, file_provider_for},
    render,
    report::ValidationReport,
    standardize::FieldStandardizer,
    table::StandardizedTable,
};

pub fn execute(args: &StandardizeArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Standardizing {:?} as '{}' with mappings from {:?}",
        args.input, args.source, args.mappings
    );

    let mut provider = file_provider_for(&args.source, &args.input, encoding);
    if let Some(kind) = args.input_format {
        provider = provider.with_format(kind.into());
    }
    if let Some(delimiter) = args.delimiter {
        provider = provider.with_delimiter(delimiter);
    }
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(provider));

    let mut fetch = StandardizedFetch::new(providers, FieldStandardizer::from_dir(&args.mappings));
    if cache::cache_enabled_from_env() {
        fetch = fetch.with_cache(DEFAULT_TTL);
    }

    let filter = DataFilter {
        columns: args
            .columns
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect(),
        sort_by: args.sort_by.clone(),
        ascending: args.ascending,
        top_n: args.top,
    };
    debug!("Output filter: {filter:?}");

    let (table, report) = fetch
        .fetch(&args.source, &FetchRequest::default(), &filter)
        .with_context(|| format!("Standardizing {:?} as '{}'", args.input, args.source))?;
    if let Some(stats) = fetch.cache_stats() {
        debug!("Cache: {stats:?}");
    }

    write_table(&table, args).with_context(|| match &args.output {
        Some(path) => format!("Writing output to {path:?}"),
        None => "Writing output to stdout".to_string(),
    })?;

    if let Some(path) = &args.report {
        report.save(path)?;
        info!("Validation report written to {path:?}");
    }
    log_report(&report);

    if args.strict && !report.is_clean() {
        bail!(
            "Strict mode: {} coerced value(s) and {} missing column(s) for source '{}'",
            report.coercions.len(),
            report.drift.len(),
            args.source
        );
    }
    Ok(())
}

fn write_table(table: &StandardizedTable, args: &StandardizeArgs) -> Result<()> {
    match args.format {
        OutputFormat::Csv => {
            let mut writer =
                io_utils::open_csv_writer(args.output.as_deref(), io_utils::DEFAULT_CSV_DELIMITER)?;
            table.write_csv(&mut writer)?;
        }
        OutputFormat::Json => {
            let mut writer = io_utils::open_output(args.output.as_deref())?;
            if args.pretty {
                serde_json::to_writer_pretty(&mut writer, &table.records())?;
            } else {
                serde_json::to_writer(&mut writer, &table.records())?;
            }
            writeln!(writer)?;
            writer.flush()?;
        }
        OutputFormat::Table => {
            let mut writer = io_utils::open_output(args.output.as_deref())?;
            write!(writer, "{}", render::render_standardized(table))?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn log_report(report: &ValidationReport) {
    info!(
        "[{}] {} unmapped raw column(s), {} dropped field(s), {} row(s) coerced",
        report.source,
        report.unmapped_columns.len(),
        report.fields_dropped.len(),
        report.rows_coerced
    );
    for (field, count) in report.coercions_by_field() {
        warn!("[{}] '{field}': {count} value(s) replaced with null", report.source);
    }
}
