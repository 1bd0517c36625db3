//! The `scan` command: what a profile finds, without writing

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::app::Session;
use super::output::Output;
use crate::domain::{Assignment, DomainKey, ScanFailure, SourceDocument};

#[derive(Serialize)]
struct ScannedDeclaration {
    name: String,
    /// 1-based, inclusive
    start_line: usize,
    end_line: usize,
    /// `None` when the declaration stays in the root
    domain: Option<DomainKey>,
}

#[derive(Serialize)]
struct ScanSummary {
    source: String,
    profile: String,
    lines: usize,
    preamble_lines: usize,
    declarations: Vec<ScannedDeclaration>,
    aggregator: Option<String>,
    failures: Vec<ScanFailure>,
}

pub fn run(output: &Output, session: &Session, source: &Path) -> Result<()> {
    let engine = session.engine()?;
    let text = fs::read_to_string(source).with_context(|| format!("Failed to read source: {}", source.display()))?;
    let doc = SourceDocument::new(source, &text);

    let outcome = engine.scanner.scan(&doc);
    output.verbose_ctx(
        "scan",
        &format!(
            "{} lines, {} declarations, {} residue runs",
            doc.line_count(),
            outcome.declarations.len(),
            outcome.residue.len()
        ),
    );

    let summary = ScanSummary {
        source: source.display().to_string(),
        profile: session.profile_name.clone(),
        lines: doc.line_count(),
        preamble_lines: outcome.preamble.split_inclusive('\n').count(),
        declarations: outcome
            .declarations
            .iter()
            .map(|span| ScannedDeclaration {
                name: span.name.clone(),
                start_line: span.start_line + 1,
                end_line: span.end_line + 1,
                domain: match engine.rules.assign(&span.name) {
                    Assignment::Domain { key, .. } => Some(key),
                    Assignment::Retained => None,
                },
            })
            .collect(),
        aggregator: outcome.aggregator.as_ref().map(|a| a.name.clone()),
        failures: outcome.failures.clone(),
    };

    if output.is_json() {
        output.data(&summary);
        return Ok(());
    }

    if summary.declarations.is_empty() {
        println!("No declarations found in {} (profile: {})", summary.source, summary.profile);
    } else {
        println!("{:<40} {:<12} DOMAIN", "NAME", "LINES");
        println!("{}", "-".repeat(70));
        for decl in &summary.declarations {
            let domain = decl
                .domain
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "(root)".to_string());
            println!(
                "{:<40} {:<12} {}",
                decl.name,
                format!("{}-{}", decl.start_line, decl.end_line),
                domain
            );
        }
        println!();
        println!("Found {} declaration(s) in {} lines", summary.declarations.len(), summary.lines);
    }

    if let Some(aggregator) = &summary.aggregator {
        println!("Aggregator: {}", aggregator);
    }
    for failure in &summary.failures {
        output.warn(&failure.to_string());
    }

    Ok(())
}
