//! Source documents and the spans cut out of them
//!
//! A [`SourceDocument`] keeps every line together with its own terminator, so
//! joining any contiguous run of lines reproduces the original bytes exactly.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Immutable input text, split into lines
#[derive(Debug, Clone)]
pub struct SourceDocument {
    path: PathBuf,
    lines: Vec<String>,
}

impl SourceDocument {
    /// Creates a document from its path and full text
    pub fn new(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
        }
    }

    /// Returns the path the document was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name used in generated headers
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Returns all lines, terminators included
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns the number of lines
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Returns the total length in bytes
    pub fn len(&self) -> usize {
        self.lines.iter().map(String::len).sum()
    }

    /// Returns true if the document has no text
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the full text
    pub fn text(&self) -> String {
        self.lines.concat()
    }

    /// Joins lines `start..end` (end exclusive)
    pub fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.lines.len());
        if start >= end {
            return String::new();
        }
        self.lines[start..end].concat()
    }
}

/// One extracted top-level declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclarationSpan {
    /// Declaration name captured by the introducer
    pub name: String,

    /// First line, 0-based
    pub start_line: usize,

    /// Last line, 0-based and inclusive
    pub end_line: usize,

    /// The exact text of lines `start_line..=end_line`
    #[serde(skip)]
    pub raw_text: String,
}

impl DeclarationSpan {
    /// Cuts a span out of a document
    pub fn from_document(doc: &SourceDocument, name: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            name: name.into(),
            start_line: start,
            end_line: end,
            raw_text: doc.slice(start, end + 1),
        }
    }

    /// Returns the number of lines covered
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    /// Returns the length of the raw text in bytes
    pub fn len(&self) -> usize {
        self.raw_text.len()
    }

    /// Returns true if the raw text is empty
    pub fn is_empty(&self) -> bool {
        self.raw_text.is_empty()
    }
}

/// Lines that belong to no declaration, preamble, aggregator or trailing text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residue {
    pub start_line: usize,
    pub text: String,
}

impl Residue {
    /// Returns true if the residue only separates declarations
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A generated output artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub relative_path: PathBuf,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(relative_path: impl Into<PathBuf>, content: String) -> Self {
        Self {
            relative_path: relative_path.into(),
            content,
        }
    }

    /// Returns the number of lines in the content
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

impl fmt::Display for GeneratedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} lines)", self.relative_path.display(), self.line_count())
    }
}
