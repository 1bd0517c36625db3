//! One partition run, end to end
//!
//! Reads the source, plans every file in memory, runs the checker, commits
//! and runs the checker again. The report is what the CLI prints.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{DomainKey, Layout, PartitionPlan, Partitioner, ScanFailure, SourceDocument};
use crate::oracle::{CheckCommand, Verification};

use super::writer::Writer;

/// Knobs for a single run
#[derive(Debug, Clone, Default)]
pub struct PartitionOptions {
    /// Plan and report without writing
    pub dry_run: bool,
    /// Replace a backup that differs from the current original
    pub force_backup: bool,
    /// Checker to run before and after the write
    pub check: Option<CheckCommand>,
}

/// One generated group file
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub domain: DomainKey,
    pub file: PathBuf,
    pub declarations: Vec<String>,
    pub imports: usize,
}

/// Summary of a run
#[derive(Debug, Clone, Serialize)]
pub struct PartitionReport {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub profile: String,
    pub groups_written: usize,
    pub declarations_extracted: usize,
    /// Names of declarations whose boundaries could not be found
    pub scan_failures: Vec<String>,
    pub failures: Vec<ScanFailure>,
    pub groups: Vec<GroupSummary>,
    pub retained: Vec<String>,
    pub unmatched: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    pub written: Vec<PathBuf>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    pub generated_at: DateTime<Utc>,
}

impl PartitionReport {
    fn new(source: &Path, out_dir: &Path, profile: &str, plan: &PartitionPlan, dry_run: bool) -> Self {
        Self {
            source: source.to_path_buf(),
            output_dir: out_dir.to_path_buf(),
            profile: profile.to_string(),
            groups_written: 0,
            declarations_extracted: plan.declarations_extracted(),
            scan_failures: plan.failure_names(),
            failures: plan.failures.clone(),
            groups: plan
                .groups
                .iter()
                .map(|g| GroupSummary {
                    domain: g.key.clone(),
                    file: out_dir.join(&g.file.relative_path),
                    declarations: g.declarations.clone(),
                    imports: g.references.len(),
                })
                .collect(),
            retained: plan.retained.clone(),
            unmatched: plan.unmatched.clone(),
            aggregator: plan.aggregator.clone(),
            backup: None,
            written: Vec::new(),
            dry_run,
            verification: None,
            generated_at: Utc::now(),
        }
    }

    /// Some declarations could not be scanned and stayed in the root
    pub fn is_partial(&self) -> bool {
        !self.scan_failures.is_empty()
    }

    /// The checker ran and did not come back clean
    pub fn needs_review(&self) -> bool {
        self.verification.as_ref().is_some_and(|v| !v.is_clean())
    }
}

/// Resolves `path` against the current directory so root and output paths compare lexically
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}

/// Reads and plans a source file without writing anything
pub fn plan_file(engine: &Partitioner, source: &Path, out_dir: &Path) -> Result<(SourceDocument, PartitionPlan)> {
    let text = fs::read_to_string(source).with_context(|| format!("Failed to read source: {}", source.display()))?;
    let doc = SourceDocument::new(source, &text);

    let source_abs = absolute(source)?;
    let layout = Layout {
        root_dir: source_abs.parent().map(Path::to_path_buf).unwrap_or_default(),
        out_dir: absolute(out_dir)?,
    };

    let plan = engine.plan(&doc, &layout);
    Ok((doc, plan))
}

/// Splits `source` into per-domain files under `out_dir`
pub fn partition(
    engine: &Partitioner,
    profile: &str,
    source: &Path,
    out_dir: &Path,
    options: &PartitionOptions,
) -> Result<PartitionReport> {
    let (_, plan) = plan_file(engine, source, out_dir)?;
    let mut report = PartitionReport::new(source, out_dir, profile, &plan, options.dry_run);

    if plan.is_noop() {
        return Ok(report);
    }

    let files: Vec<_> = plan.groups.iter().map(|g| g.file.clone()).collect();
    Writer::check_targets(source, out_dir, &files)
        .with_context(|| format!("Failed to partition {}", source.display()))?;

    if options.dry_run {
        return Ok(report);
    }

    let check_dir = source
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let before = options.check.as_ref().map(|c| c.run(&check_dir));

    let committed = Writer::new()
        .overwrite_backup(options.force_backup)
        .commit(source, out_dir, &files, &plan.root.content)
        .with_context(|| format!("Failed to partition {}", source.display()))?;

    report.groups_written = committed.written.len();
    report.backup = Some(committed.backup);
    report.written = committed.written;

    if let (Some(check), Some(before)) = (&options.check, before) {
        let after = check.run(&check_dir);
        report.verification = Some(Verification::compare(before, after));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::Verdict;
    use crate::storage::config::ProfileConfig;
    use crate::storage::writer::WriteError;
    use std::time::Duration;
    use tempfile::TempDir;

    const DB: &str = r#"import { getDb } from "./connection";

export async function createTask() {
  return db.select().from(tasks);
}

export async function createDefect() {
  return db.select().from(defects);
}

export async function getDb() {
  return null;
}
"#;

    fn engine() -> Partitioner {
        ProfileConfig::repository().compile("repository").unwrap()
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("db.ts");
        fs::write(&source, DB).unwrap();
        let out = dir.path().join("repositories");
        (dir, source, out)
    }

    #[test]
    fn writes_groups_and_root() {
        let (_dir, source, out) = setup();

        let report = partition(&engine(), "repository", &source, &out, &PartitionOptions::default()).unwrap();

        assert_eq!(report.groups_written, 2);
        assert_eq!(report.declarations_extracted, 2);
        assert_eq!(report.retained, vec!["getDb"]);
        assert!(report.scan_failures.is_empty());

        let task = fs::read_to_string(out.join("task.repository.ts")).unwrap();
        assert!(task.contains("export class TaskRepository extends BaseRepository {"));
        assert!(task.contains("  async createTask() {\n    return this.db.select().from(tasks);\n  }\n"));
        assert!(task.contains("import { tasks } from \"../../drizzle/schema\";"));

        let root = fs::read_to_string(&source).unwrap();
        assert!(root.contains("export { TaskRepository } from \"./repositories/task.repository\";"));
        assert!(root.contains("export async function getDb()"));
        assert!(!root.contains("createDefect"));

        assert_eq!(fs::read_to_string(report.backup.unwrap()).unwrap(), DB);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let (_dir, source, out) = setup();
        let options = PartitionOptions {
            dry_run: true,
            ..PartitionOptions::default()
        };

        let report = partition(&engine(), "repository", &source, &out, &options).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.groups_written, 0);
        assert!(!out.exists());
        assert!(!Writer::backup_path(&source).exists());
        assert_eq!(fs::read_to_string(&source).unwrap(), DB);
    }

    #[test]
    fn nothing_extracted_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("empty.ts");
        fs::write(&source, "export const x = 1;\n").unwrap();
        let out = dir.path().join("out");

        let report = partition(&engine(), "repository", &source, &out, &PartitionOptions::default()).unwrap();

        assert_eq!(report.groups_written, 0);
        assert!(report.backup.is_none());
        assert!(!out.exists());
    }

    #[test]
    fn second_run_is_noop() {
        let (_dir, source, out) = setup();
        partition(&engine(), "repository", &source, &out, &PartitionOptions::default()).unwrap();
        let root = fs::read_to_string(&source).unwrap();

        let report = partition(&engine(), "repository", &source, &out, &PartitionOptions::default()).unwrap();

        assert_eq!(report.groups_written, 0);
        assert_eq!(fs::read_to_string(&source).unwrap(), root);
    }

    #[test]
    fn group_file_over_source_is_refused() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("taskRouter.ts");
        let text = r#"import { router } from "./_core/trpc";

const taskRouter = router({
  list: publicProcedure.query(() => db.listTasks()),
});

const defectRouter = router({
  get: publicProcedure.query(() => db.getDefect()),
});
"#;
        fs::write(&source, text).unwrap();
        let engine = ProfileConfig::router().compile("router").unwrap();

        for dry_run in [true, false] {
            let options = PartitionOptions {
                dry_run,
                ..PartitionOptions::default()
            };
            let err = partition(&engine, "router", &source, dir.path(), &options).unwrap_err();

            assert!(matches!(
                err.downcast_ref::<WriteError>(),
                Some(WriteError::Collision { .. })
            ));
        }

        assert_eq!(fs::read_to_string(&source).unwrap(), text);
        assert!(!Writer::backup_path(&source).exists());
        assert!(!dir.path().join("defectRouter.ts").exists());
    }

    #[test]
    fn partial_scan_is_reported() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("db.ts");
        fs::write(&source, format!("{DB}export async function getTaskStats() {{\n  if (x) {{\n")).unwrap();
        let out = dir.path().join("repositories");

        let report = partition(&engine(), "repository", &source, &out, &PartitionOptions::default()).unwrap();

        assert!(report.is_partial());
        assert_eq!(report.scan_failures, vec!["getTaskStats"]);
        assert_eq!(report.groups_written, 2);
        assert!(fs::read_to_string(&source).unwrap().contains("getTaskStats"));
    }

    #[cfg(unix)]
    #[test]
    fn verification_runs_around_write() {
        let (_dir, source, out) = setup();
        let check = CheckCommand::new(
            &["sh".to_string(), "-c".to_string(), "exit 0".to_string()],
            Duration::from_secs(10),
        )
        .unwrap();
        let options = PartitionOptions {
            check: Some(check),
            ..PartitionOptions::default()
        };

        let report = partition(&engine(), "repository", &source, &out, &options).unwrap();

        let verification = report.verification.unwrap();
        assert_eq!(verification.verdict, Verdict::Clean);
    }

    #[cfg(unix)]
    #[test]
    fn regression_needs_review() {
        let (_dir, source, out) = setup();
        // Passes while the original still holds createTask, fails afterwards
        let script = format!("grep -q createTask {}", source.display());
        let check = CheckCommand::new(&["sh".to_string(), "-c".to_string(), script], Duration::from_secs(10)).unwrap();
        let options = PartitionOptions {
            check: Some(check),
            ..PartitionOptions::default()
        };

        let report = partition(&engine(), "repository", &source, &out, &options).unwrap();

        assert!(report.needs_review());
        assert_eq!(report.verification.unwrap().verdict, Verdict::Regressed);
    }
}
