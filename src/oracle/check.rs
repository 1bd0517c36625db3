//! External checker invocation
//!
//! Runs the configured command, drains its output on helper threads and
//! polls for exit until the deadline. A timed-out or unlaunchable checker is
//! `Unknown`, which callers must treat as needing review.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error, PartialEq)]
pub enum CheckError {
    #[error("Check command is empty")]
    EmptyCommand,

    #[error("Invalid diagnostic pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Result of one checker run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed { diagnostics: usize },
    Failed { diagnostics: usize },
    Unknown { reason: String },
}

impl CheckOutcome {
    pub fn diagnostics(&self) -> Option<usize> {
        match self {
            CheckOutcome::Passed { diagnostics } | CheckOutcome::Failed { diagnostics } => Some(*diagnostics),
            CheckOutcome::Unknown { .. } => None,
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, CheckOutcome::Passed { .. })
    }

    pub fn label(&self) -> String {
        match self {
            CheckOutcome::Passed { diagnostics } => format!("passed ({} diagnostics)", diagnostics),
            CheckOutcome::Failed { diagnostics } => format!("failed ({} diagnostics)", diagnostics),
            CheckOutcome::Unknown { reason } => format!("unknown ({})", reason),
        }
    }
}

/// Overall judgement of a before/after pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// No more diagnostics than before
    Clean,
    /// More diagnostics, or a pass turned into a failure
    Regressed,
    /// At least one run did not finish
    Unknown,
}

/// Checker results around a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub before: CheckOutcome,
    pub after: CheckOutcome,
    pub verdict: Verdict,
}

impl Verification {
    pub fn compare(before: CheckOutcome, after: CheckOutcome) -> Self {
        let verdict = match (before.diagnostics(), after.diagnostics()) {
            (Some(_), Some(_)) if before.passed() && !after.passed() => Verdict::Regressed,
            (Some(b), Some(a)) if a > b => Verdict::Regressed,
            (Some(_), Some(_)) => Verdict::Clean,
            _ => Verdict::Unknown,
        };
        Self {
            before,
            after,
            verdict,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.verdict == Verdict::Clean
    }
}

/// A configured checker command
#[derive(Debug, Clone)]
pub struct CheckCommand {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    diagnostic: Option<Regex>,
    working_dir: Option<PathBuf>,
}

impl CheckCommand {
    pub fn new(command: &[String], timeout: Duration) -> Result<Self, CheckError> {
        let (program, args) = command.split_first().ok_or(CheckError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(CheckError::EmptyCommand);
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
            diagnostic: None,
            working_dir: None,
        })
    }

    /// Counts output lines matching `pattern` as diagnostics
    pub fn with_diagnostic_pattern(mut self, pattern: Option<&str>) -> Result<Self, CheckError> {
        self.diagnostic = pattern
            .map(|p| {
                Regex::new(p).map_err(|e| CheckError::InvalidPattern {
                    pattern: p.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;
        Ok(self)
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The command line as typed
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the checker; `default_dir` is used when no working dir is configured
    pub fn run(&self, default_dir: &Path) -> CheckOutcome {
        let dir = self.working_dir.as_deref().unwrap_or(default_dir);

        let mut child = match Command::new(&self.program)
            .args(&self.args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return CheckOutcome::Unknown {
                    reason: format!("failed to launch '{}': {}", self.program, e),
                }
            }
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_with_deadline(&mut child, self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                return CheckOutcome::Unknown {
                    reason: format!("timed out after {}s", self.timeout.as_secs_f64()),
                }
            }
            Err(e) => {
                return CheckOutcome::Unknown {
                    reason: format!("failed to wait for checker: {}", e),
                }
            }
        };

        let output = format!(
            "{}{}",
            stdout.join().unwrap_or_default(),
            stderr.join().unwrap_or_default()
        );
        let diagnostics = self.count_diagnostics(&output, status.success());

        if status.success() {
            CheckOutcome::Passed { diagnostics }
        } else {
            CheckOutcome::Failed { diagnostics }
        }
    }

    /// Without a pattern a failing run counts as one diagnostic
    fn count_diagnostics(&self, output: &str, success: bool) -> usize {
        match &self.diagnostic {
            Some(pattern) => output.lines().filter(|line| pattern.is_match(line)).count(),
            None => usize::from(!success),
        }
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Polls until exit or deadline; kills the child on expiry
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
