//! Declaration scanner
//!
//! Finds top-level declarations by tracking delimiter balance line by line.
//! The scanner is a two-state machine: it either seeks the next introducer
//! line or sits inside a body with a running balance. A body closes on the
//! first line where the balance is back to zero, at least one opening
//! delimiter has been seen, and the closing marker is present.
//!
//! Delimiters inside string literals and comments are counted like any other.
//! Inputs that rely on that will mis-scan; the external checker catches it.

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use super::source::{DeclarationSpan, Residue, SourceDocument};

/// A declaration whose boundaries could not be determined
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanFailure {
    #[error("{name} (line {}): block is still open at end of file", .line + 1)]
    Unterminated { name: String, line: usize },

    #[error("{name} (line {}): next declaration starts at line {} before this one closes", .line + 1, .next_line + 1)]
    Interrupted {
        name: String,
        line: usize,
        next_line: usize,
    },
}

impl ScanFailure {
    /// Returns the name of the declaration that failed to scan
    pub fn name(&self) -> &str {
        match self {
            ScanFailure::Unterminated { name, .. } | ScanFailure::Interrupted { name, .. } => name,
        }
    }
}

/// Patterns that drive the scanner
#[derive(Debug, Clone)]
pub struct ScanPatterns {
    /// Matches the first line of a regular declaration; group 1 (or `name`) is the name
    pub introducer: Regex,

    /// Matches the first line of the aggregator
    pub aggregator: Option<Regex>,

    pub open: char,
    pub close: char,

    /// Token that must be present on a declaration's last line
    pub closing_marker: String,
}

/// Everything the scanner found, in source order
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Text before the first declaration
    pub preamble: String,

    pub declarations: Vec<DeclarationSpan>,

    /// Unclaimed lines between declarations, including text of failed declarations
    pub residue: Vec<Residue>,

    pub aggregator: Option<DeclarationSpan>,

    /// Text after the aggregator's last line
    pub trailing: String,

    pub failures: Vec<ScanFailure>,
}

impl ScanOutcome {
    /// Total bytes accounted for; equals the source length for every input
    pub fn accounted_len(&self) -> usize {
        self.preamble.len()
            + self.declarations.iter().map(DeclarationSpan::len).sum::<usize>()
            + self.residue.iter().map(|r| r.text.len()).sum::<usize>()
            + self.aggregator.as_ref().map_or(0, DeclarationSpan::len)
            + self.trailing.len()
    }
}

/// A declaration currently being scanned
#[derive(Debug)]
struct OpenBody {
    name: String,
    start: usize,
    balance: i64,
    opened: bool,
    aggregator: bool,
}

#[derive(Debug)]
enum State {
    SeekingIntroducer,
    InBody(OpenBody),
}

/// A line that starts a declaration
struct Introducer {
    name: String,
    aggregator: bool,
}

/// Scans documents into declaration spans
#[derive(Debug, Clone)]
pub struct Scanner {
    patterns: ScanPatterns,
}

impl Scanner {
    pub fn new(patterns: ScanPatterns) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &ScanPatterns {
        &self.patterns
    }

    /// Scans a document; never fails, collects per-declaration failures instead
    pub fn scan(&self, doc: &SourceDocument) -> ScanOutcome {
        let lines = doc.lines();
        let mut outcome = ScanOutcome::default();
        let mut state = State::SeekingIntroducer;
        // First line not yet assigned to any part of the outcome
        let mut cursor = 0;
        let mut seen_declaration = false;
        let mut idx = 0;

        while idx < lines.len() {
            let line = &lines[idx];
            let introducer = self.match_introducer(line);

            let interrupted = match (&state, &introducer) {
                (State::InBody(body), Some(_)) => Some(ScanFailure::Interrupted {
                    name: body.name.clone(),
                    line: body.start,
                    next_line: idx,
                }),
                _ => None,
            };

            if let Some(failure) = interrupted {
                outcome.failures.push(failure);
                push_residue(&mut outcome, doc, cursor, idx);
                cursor = idx;
                state = State::SeekingIntroducer;
            }

            if let State::SeekingIntroducer = state {
                match introducer {
                    Some(found) => {
                        if seen_declaration {
                            push_residue(&mut outcome, doc, cursor, idx);
                        } else {
                            outcome.preamble = doc.slice(0, idx);
                            seen_declaration = true;
                        }
                        cursor = idx;
                        state = State::InBody(OpenBody {
                            name: found.name,
                            start: idx,
                            balance: 0,
                            opened: false,
                            aggregator: found.aggregator,
                        });
                    }
                    None => {
                        idx += 1;
                        continue;
                    }
                }
            }

            if let State::InBody(body) = &mut state {
                for ch in line.chars() {
                    if ch == self.patterns.open {
                        body.balance += 1;
                        body.opened = true;
                    } else if ch == self.patterns.close {
                        body.balance -= 1;
                    }
                }

                if body.balance == 0 && body.opened && line.contains(&self.patterns.closing_marker) {
                    let span = DeclarationSpan::from_document(doc, body.name.clone(), body.start, idx);
                    cursor = idx + 1;

                    if body.aggregator {
                        outcome.aggregator = Some(span);
                        outcome.trailing = doc.slice(cursor, lines.len());
                        cursor = lines.len();
                        state = State::SeekingIntroducer;
                        break;
                    }

                    outcome.declarations.push(span);
                    state = State::SeekingIntroducer;
                }
            }

            idx += 1;
        }

        match state {
            State::InBody(body) => {
                outcome.failures.push(ScanFailure::Unterminated {
                    name: body.name,
                    line: body.start,
                });
                push_residue(&mut outcome, doc, cursor, lines.len());
            }
            State::SeekingIntroducer if !seen_declaration => {
                outcome.preamble = doc.text();
            }
            State::SeekingIntroducer => {
                push_residue(&mut outcome, doc, cursor, lines.len());
            }
        }

        outcome
    }

    fn match_introducer(&self, line: &str) -> Option<Introducer> {
        let line = line.trim_end_matches(['\n', '\r']);

        if let Some(aggregator) = &self.patterns.aggregator {
            if let Some(caps) = aggregator.captures(line) {
                return Some(Introducer {
                    name: capture_name(&caps),
                    aggregator: true,
                });
            }
        }

        self.patterns.introducer.captures(line).map(|caps| Introducer {
            name: capture_name(&caps),
            aggregator: false,
        })
    }
}

/// Prefers a `name` group, then group 1, then the whole match
fn capture_name(caps: &regex::Captures<'_>) -> String {
    caps.name("name")
        .or_else(|| caps.get(1))
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn push_residue(outcome: &mut ScanOutcome, doc: &SourceDocument, start: usize, end: usize) {
    if start < end {
        outcome.residue.push(Residue {
            start_line: start,
            text: doc.slice(start, end),
        });
    }
}
