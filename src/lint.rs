use anyhow::{Context, Result, bail};
use log::info;

use crate::{cli::LintArgs, mapping, naming::NamingRules, render};

pub fn execute(args: &LintArgs) -> Result<()> {
    let report = mapping::lint_directory(&args.mappings, NamingRules::standard())
        .with_context(|| format!("Linting mapping documents in {:?}", args.mappings))?;
    info!(
        "Checked {} mapping document(s) in {:?}",
        report.sources.len() + report.load_errors.len(),
        args.mappings
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for failure in &report.load_errors {
            println!("error: {}", failure.message);
        }
        for violation in &report.violations {
            println!("violation: {violation}");
        }
        if !report.hints.is_empty() {
            let headers = ["source", "canonical_name", "field_type", "suggestion"]
                .map(str::to_string)
                .to_vec();
            let rows = report
                .hints
                .iter()
                .map(|hint| {
                    vec![
                        hint.source_id.clone(),
                        hint.canonical_name.clone(),
                        hint.field_type.to_string(),
                        hint.suggestion.clone(),
                    ]
                })
                .collect::<Vec<_>>();
            println!("Naming hints (advisory):");
            print!("{}", render::render_table(&headers, &rows));
        }
        if report.is_clean() {
            println!("{} source(s) OK", report.sources.len());
        }
    }

    if !report.is_clean() {
        bail!(
            "{} violation(s) and {} unreadable document(s) in {:?}",
            report.violations.len(),
            report.load_errors.len(),
            args.mappings
        );
    }
    Ok(())
}
