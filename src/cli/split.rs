//! The `split` command

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use super::app::Session;
use super::output::Output;
use crate::oracle::Verdict;
use crate::storage::{partition, CommitError, PartitionOptions, PartitionReport};

/// JSON shape of a run that stopped partway through writing
#[derive(Serialize)]
struct AbortedSplit<'a> {
    source: &'a PathBuf,
    error: String,
    written: &'a [PathBuf],
    root_untouched: bool,
}

pub struct SplitArgs {
    pub source: PathBuf,
    pub out: PathBuf,
    pub dry_run: bool,
    pub check: bool,
    pub check_timeout: Option<u64>,
    pub force: bool,
}

pub fn run(output: &Output, session: &Session, args: &SplitArgs) -> Result<()> {
    let engine = session.engine()?;

    if args.check && args.dry_run {
        output.warn("--check is ignored with --dry-run; nothing is written, so nothing is verified");
    }

    let check = if args.check {
        let command = session
            .profile
            .check_command(&session.profile_name, session.config.base_dir())
            .with_context(|| format!("Failed to load check for profile '{}'", session.profile_name))?;
        let Some(command) = command else {
            bail!("Profile '{}' has no check command configured", session.profile_name);
        };
        let command = match args.check_timeout {
            Some(secs) => command.with_timeout(Duration::from_secs(secs)),
            None => command,
        };
        output.verbose_ctx(
            "split",
            &format!("Check: {} (timeout {}s)", command.display(), command.timeout().as_secs()),
        );
        Some(command)
    } else {
        None
    };

    output.verbose_ctx(
        "split",
        &format!(
            "Splitting {} into {} (dry_run={})",
            args.source.display(),
            args.out.display(),
            args.dry_run
        ),
    );

    let options = PartitionOptions {
        dry_run: args.dry_run,
        force_backup: args.force,
        check,
    };
    let report = match partition(&engine, &session.profile_name, &args.source, &args.out, &options) {
        Ok(report) => report,
        Err(err) => {
            if output.is_json() {
                if let Some(commit) = err.downcast_ref::<CommitError>() {
                    output.data(&AbortedSplit {
                        source: &args.source,
                        error: format!("{:#}", err),
                        written: &commit.written,
                        root_untouched: true,
                    });
                }
            }
            return Err(err);
        }
    };

    output.verbose_ctx(
        "split",
        &format!(
            "{} groups, {} declarations, {} scan failures",
            report.groups.len(),
            report.declarations_extracted,
            report.scan_failures.len()
        ),
    );

    if output.is_json() {
        output.data(&report);
    } else {
        print_report(output, &report);
    }

    if let Some(verification) = &report.verification {
        match verification.verdict {
            Verdict::Clean => {}
            Verdict::Regressed => bail!(
                "Verification regressed: before {}, after {}. Review the output or run `partition restore {}`",
                verification.before.label(),
                verification.after.label(),
                report.source.display()
            ),
            Verdict::Unknown => bail!(
                "Verification inconclusive: before {}, after {}. Review the output before relying on it",
                verification.before.label(),
                verification.after.label()
            ),
        }
    }

    Ok(())
}

fn print_report(output: &Output, report: &PartitionReport) {
    if report.groups.is_empty() {
        println!(
            "No declarations to extract from {} (profile: {}); nothing written.",
            report.source.display(),
            report.profile
        );
    } else {
        let verb = if report.dry_run { "Would write" } else { "Wrote" };
        println!("{} {} (profile: {}):", verb, report.source.display(), report.profile);
        println!("{:<16} {:<6} {:<8} FILE", "DOMAIN", "DECLS", "IMPORTS");
        println!("{}", "-".repeat(70));
        for group in &report.groups {
            println!(
                "{:<16} {:<6} {:<8} {}",
                group.domain,
                group.declarations.len(),
                group.imports,
                group.file.display()
            );
        }
        println!();
        println!(
            "{} {} declarations into {} files",
            if report.dry_run { "Would extract" } else { "Extracted" },
            report.declarations_extracted,
            report.groups.len()
        );
    }

    if !report.retained.is_empty() {
        println!("Kept in root: {}", report.retained.join(", "));
    }
    if !report.unmatched.is_empty() {
        println!("Unmatched (misc): {}", report.unmatched.join(", "));
    }
    if let Some(backup) = &report.backup {
        println!("Backup: {}", backup.display());
    }

    for failure in &report.failures {
        output.warn(&format!("could not scan {}; left in place", failure));
    }

    if let Some(verification) = &report.verification {
        println!(
            "Check: before {}, after {}",
            verification.before.label(),
            verification.after.label()
        );
    }
}
