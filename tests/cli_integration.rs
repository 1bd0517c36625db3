//! CLI integration tests for partition
//!
//! These run the real binary against files in a temp directory and check
//! what ends up on disk as well as what gets printed.

use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a command instance for the partition binary
fn partition_cmd() -> assert_cmd::Command {
    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("partition"))
}

const CONFIG: &str = r#"
default_profile = "domains"

[profiles.domains]
extension = "ts"

[profiles.domains.classify]
rules = [
  { key = "task", pattern = "Task" },
  { key = "defect", pattern = "Defect" },
  { key = "inspection", pattern = "Inspection" },
]
retain = ["getDb"]

[profiles.domains.references]
base = [{ name = "eq", module = "drizzle-orm" }]
symbols = [{ name = "logger", module = "../logger" }]
"#;

const DB: &str = r#"import { eq } from "drizzle-orm";

export async function getDb() {
  return null;
}

export async function createTask(title: string) {
  return { title };
}

export async function createDefect() {
  logger.info("defect created");
  logger.info("again");
  logger.warn("and again");
}

export async function updateTask(id: number) {
  if (id > 0) {
    return { id };
  }
}

export async function createInspection() {
  return {};
}
"#;

/// Temp dir holding `.partition.toml` and `db.ts`
fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".partition.toml"), CONFIG).unwrap();
    fs::write(dir.path().join("db.ts"), DB).unwrap();
    dir
}

fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).unwrap()
}

// =============================================================================
// Split Tests
// =============================================================================

#[test]
fn test_split_groups_by_domain() {
    let dir = setup_project();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Extracted 4 declarations into 3 files"))
        .stdout(predicate::str::contains("Kept in root: getDb"));

    let task = read(dir.path().join("domains/task.ts"));
    let create = task.find("export async function createTask").unwrap();
    let update = task.find("export async function updateTask").unwrap();
    assert!(create < update);
    assert!(!task.contains("createDefect"));

    let defect = read(dir.path().join("domains/defect.ts"));
    assert!(defect.contains("export async function createDefect()"));

    let root = read(dir.path().join("db.ts"));
    assert!(root.starts_with("import { eq } from \"drizzle-orm\";\n"));
    assert!(root.contains("import { createTask, updateTask } from \"./domains/task\";"));
    assert!(root.contains("import { createDefect } from \"./domains/defect\";"));
    assert!(root.contains("export async function getDb() {"));
    assert!(!root.contains("export async function createTask"));

    assert_eq!(read(dir.path().join("db.ts.backup")), DB);
}

#[test]
fn test_split_preserves_bodies() {
    let dir = setup_project();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains"])
        .assert()
        .success();

    let task = read(dir.path().join("domains/task.ts"));
    assert!(task.contains(
        "export async function updateTask(id: number) {\n  if (id > 0) {\n    return { id };\n  }\n}\n"
    ));
}

#[test]
fn test_split_imports_helper_once() {
    let dir = setup_project();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains"])
        .assert()
        .success();

    let defect = read(dir.path().join("domains/defect.ts"));
    assert_eq!(defect.matches("import { logger } from \"../logger\";").count(), 1);
    assert!(defect.contains("import { eq } from \"drizzle-orm\";"));

    let task = read(dir.path().join("domains/task.ts"));
    assert!(!task.contains("logger"));
}

#[test]
fn test_split_reports_scan_failures() {
    let dir = setup_project();
    let broken = format!("{DB}\nexport async function deleteTask() {{\n  if (true) {{\n    return;\n");
    fs::write(dir.path().join("db.ts"), &broken).unwrap();

    let output = partition_cmd()
        .current_dir(dir.path())
        .args(["--format", "json", "split", "db.ts", "--out", "domains"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["scan_failures"], serde_json::json!(["deleteTask"]));
    assert_eq!(report["groups_written"], 3);
    assert_eq!(report["declarations_extracted"], 4);

    let task = read(dir.path().join("domains/task.ts"));
    assert!(!task.contains("deleteTask"));
    assert!(read(dir.path().join("db.ts")).contains("export async function deleteTask() {"));
}

#[test]
fn test_split_write_failure_keeps_original() {
    let dir = setup_project();
    // A directory in place of the second group file
    fs::create_dir_all(dir.path().join("domains/defect.ts")).unwrap();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already written"))
        .stderr(predicate::str::contains("task.ts"));

    assert_eq!(read(dir.path().join("db.ts")), DB);
    assert_eq!(read(dir.path().join("db.ts.backup")), DB);
    assert!(dir.path().join("domains/task.ts").is_file());
    assert!(!dir.path().join("domains/inspection.ts").exists());
}

#[test]
fn test_split_write_failure_json_lists_written() {
    let dir = setup_project();
    fs::create_dir_all(dir.path().join("domains/defect.ts")).unwrap();

    let output = partition_cmd()
        .current_dir(dir.path())
        .args(["--format", "json", "split", "db.ts", "--out", "domains"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let written = json["written"].as_array().unwrap();
    assert_eq!(written.len(), 1);
    assert!(written[0].as_str().unwrap().ends_with("task.ts"));
    assert_eq!(json["root_untouched"], true);
    assert_eq!(read(dir.path().join("db.ts")), DB);
}

#[test]
fn test_split_refuses_group_over_source() {
    let dir = setup_project();
    fs::write(dir.path().join("task.ts"), DB).unwrap();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "task.ts", "--out", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("would overwrite"));

    assert_eq!(read(dir.path().join("task.ts")), DB);
    assert!(!dir.path().join("task.ts.backup").exists());
    assert!(!dir.path().join("defect.ts").exists());
}

#[cfg(unix)]
#[test]
fn test_split_check_with_dry_run_warns() {
    let dir = setup_project();
    let config = format!("{CONFIG}\n[profiles.domains.check]\ncommand = [\"true\"]\n");
    fs::write(dir.path().join(".partition.toml"), config).unwrap();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains", "--check", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("--check is ignored with --dry-run"));

    assert!(!dir.path().join("domains").exists());
}

#[test]
fn test_split_dry_run_writes_nothing() {
    let dir = setup_project();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would extract 4 declarations into 3 files"));

    assert!(!dir.path().join("domains").exists());
    assert!(!dir.path().join("db.ts.backup").exists());
    assert_eq!(read(dir.path().join("db.ts")), DB);
}

#[test]
fn test_split_twice_is_noop() {
    let dir = setup_project();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains"])
        .assert()
        .success();
    let root = read(dir.path().join("db.ts"));

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing written"));

    assert_eq!(read(dir.path().join("db.ts")), root);
}

#[test]
fn test_split_existing_backup_needs_force() {
    let dir = setup_project();
    fs::write(dir.path().join("db.ts.backup"), "stale\n").unwrap();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    assert_eq!(read(dir.path().join("db.ts")), DB);

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains", "--force"])
        .assert()
        .success();
    assert_eq!(read(dir.path().join("db.ts.backup")), DB);
}

#[test]
fn test_split_router_profile() {
    let dir = TempDir::new().unwrap();
    let server = dir.path().join("server");
    fs::create_dir_all(&server).unwrap();
    fs::write(
        server.join("routers.ts"),
        r#"import { router } from "./_core/trpc";

const taskRouter = router({
  list: publicProcedure.query(() => {
    return db.getTasks();
  }),
});

const defectRouter = router({
  list: publicProcedure.query(() => logger.info("list")),
});

export const appRouter = router({
  task: taskRouter,
  defect: defectRouter,
});

export type AppRouter = typeof appRouter;
"#,
    )
    .unwrap();

    partition_cmd()
        .current_dir(dir.path())
        .args(["--profile", "router", "split", "server/routers.ts", "--out", "server/routers"])
        .assert()
        .success();

    let task = read(server.join("routers/taskRouter.ts"));
    assert!(task.contains("import * as db from \"../db\";"));
    assert!(task.contains("import { z } from \"zod\";"));
    assert!(task.contains("export const taskRouter = router({"));
    assert!(!task.contains("../logger"));

    let defect = read(server.join("routers/defectRouter.ts"));
    assert!(defect.contains("import { logger } from \"../logger\";"));

    let root = read(server.join("routers.ts"));
    assert!(root.contains("// Import feature-based routers"));
    assert!(root.contains("import { taskRouter } from \"./routers/taskRouter\";"));
    assert!(root.contains("import { defectRouter } from \"./routers/defectRouter\";"));
    assert!(root.contains("export const appRouter = router({\n  task: taskRouter,"));
    assert!(root.ends_with("export type AppRouter = typeof appRouter;\n"));
    assert!(!root.contains("const taskRouter = router"));
}

#[cfg(unix)]
#[test]
fn test_split_check_regression_fails() {
    let dir = setup_project();
    let config = format!(
        "{CONFIG}\n[profiles.domains.check]\ncommand = [\"sh\", \"-c\", \"grep -q 'function createTask' db.ts\"]\ntimeout_secs = 30\n"
    );
    fs::write(dir.path().join(".partition.toml"), config).unwrap();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains", "--check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Verification regressed"));

    // The write itself happened; restore is the way back
    assert!(dir.path().join("domains/task.ts").is_file());
}

#[test]
fn test_split_check_without_command() {
    let dir = setup_project();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains", "--check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no check command"));

    assert_eq!(read(dir.path().join("db.ts")), DB);
}

// =============================================================================
// Scan and Classify Tests
// =============================================================================

#[test]
fn test_scan_lists_declarations() {
    let dir = setup_project();

    partition_cmd()
        .current_dir(dir.path())
        .args(["scan", "db.ts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("createTask"))
        .stdout(predicate::str::contains("(root)"))
        .stdout(predicate::str::contains("Found 5 declaration(s)"));

    assert!(!dir.path().join("db.ts.backup").exists());
}

#[test]
fn test_scan_json() {
    let dir = setup_project();

    let output = partition_cmd()
        .current_dir(dir.path())
        .args(["scan", "db.ts", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let decls = summary["declarations"].as_array().unwrap();
    assert_eq!(decls.len(), 5);
    assert_eq!(decls[0]["name"], "getDb");
    assert_eq!(decls[0]["start_line"], 3);
    assert_eq!(decls[0]["domain"], serde_json::Value::Null);
    assert_eq!(decls[1]["domain"], "task");
}

#[test]
fn test_classify_builtin_repository() {
    let dir = TempDir::new().unwrap();

    partition_cmd()
        .current_dir(dir.path())
        .args(["classify", "createDefect", "getTaskStats", "getDb", "--profile", "repository"])
        .assert()
        .success()
        .stdout(predicate::str::contains("createDefect\tdefect"))
        .stdout(predicate::str::contains("getTaskStats\ttask"))
        .stdout(predicate::str::contains("getDb\t(root)"));
}

#[test]
fn test_classify_unmatched_is_misc() {
    let dir = setup_project();

    partition_cmd()
        .current_dir(dir.path())
        .args(["classify", "sendEmail"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sendEmail\tmisc"));
}

#[test]
fn test_unknown_profile() {
    let dir = TempDir::new().unwrap();

    partition_cmd()
        .current_dir(dir.path())
        .args(["classify", "x", "--profile", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown profile 'nope'"));
}

// =============================================================================
// Restore and Init Tests
// =============================================================================

#[test]
fn test_restore_after_split() {
    let dir = setup_project();

    partition_cmd()
        .current_dir(dir.path())
        .args(["split", "db.ts", "--out", "domains"])
        .assert()
        .success();
    assert_ne!(read(dir.path().join("db.ts")), DB);

    partition_cmd()
        .current_dir(dir.path())
        .args(["restore", "db.ts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored db.ts"));

    assert_eq!(read(dir.path().join("db.ts")), DB);
}

#[test]
fn test_restore_without_backup_fails() {
    let dir = setup_project();

    partition_cmd()
        .current_dir(dir.path())
        .args(["restore", "db.ts"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No backup found"));
}

#[test]
fn test_init_writes_starter_config() {
    let dir = TempDir::new().unwrap();

    partition_cmd()
        .arg("init")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    let config = dir.path().join(".partition.toml");
    assert!(read(&config).contains("[profiles.router"));

    partition_cmd()
        .arg("--config")
        .arg(&config)
        .arg("profiles")
        .assert()
        .success()
        .stdout(predicate::str::contains("repository"))
        .stdout(predicate::str::contains("router"));

    // Second init refuses to clobber
    partition_cmd()
        .arg("init")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_verbose_logs_to_stderr() {
    let dir = setup_project();

    partition_cmd()
        .current_dir(dir.path())
        .args(["--verbose", "scan", "db.ts"])
        .assert()
        .success()
        .stderr(predicate::str::contains("[verbose:config] Using profile: domains"));
}
