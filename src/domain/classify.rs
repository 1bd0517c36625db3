//! Domain classification by declaration name
//!
//! Rules are plain data: an ordered list of `(key, pattern)` pairs searched
//! case-insensitively. The first matching rule wins; no match lands in `misc`.

use std::collections::HashSet;
use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ClassifyError {
    #[error("Invalid domain key '{0}': use letters, digits, '_' or '-'")]
    InvalidKey(String),

    #[error("Invalid pattern for domain '{key}': {message}")]
    InvalidPattern { key: String, message: String },
}

/// The semantic group a declaration belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DomainKey {
    Named(String),
    Misc,
}

impl DomainKey {
    pub const MISC: &'static str = "misc";

    /// Parses a key, mapping `misc` to [`DomainKey::Misc`]
    pub fn parse(key: &str) -> Result<Self, ClassifyError> {
        let key = key.trim();
        if key.eq_ignore_ascii_case(Self::MISC) {
            return Ok(DomainKey::Misc);
        }
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ClassifyError::InvalidKey(key.to_string()));
        }
        Ok(DomainKey::Named(key.to_string()))
    }

    /// Key for a declaration that forms its own group: first letter lower-cased
    pub fn from_declaration(name: &str) -> Self {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => DomainKey::Named(first.to_lowercase().chain(chars).collect()),
            None => DomainKey::Misc,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DomainKey::Named(key) => key,
            DomainKey::Misc => Self::MISC,
        }
    }

    pub fn is_misc(&self) -> bool {
        matches!(self, DomainKey::Misc)
    }

    /// The key with its first letter upper-cased (`task` -> `Task`)
    pub fn title(&self) -> String {
        let key = self.as_str();
        let mut chars = key.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DomainKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// How declarations are bucketed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grouping {
    /// Ordered pattern rules
    #[default]
    Rules,
    /// Every declaration is its own group
    Declaration,
}

/// Where a declaration goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// Stays in the composition root
    Retained,
    /// Extracted into a domain group; `matched` is false for the `misc` fallback
    Domain { key: DomainKey, matched: bool },
}

/// A single `(key, pattern)` rule
#[derive(Debug, Clone)]
pub struct DomainRule {
    pub key: DomainKey,
    pattern: Regex,
}

impl DomainRule {
    pub fn new(key: &str, pattern: &str) -> Result<Self, ClassifyError> {
        let key = DomainKey::parse(key)?;
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ClassifyError::InvalidPattern {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { key, pattern })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Ordered rules plus the names that must never leave the root
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<DomainRule>,
    retained: HashSet<String>,
    grouping: Grouping,
    extract_misc: bool,
}

impl RuleTable {
    pub fn new(rules: Vec<DomainRule>) -> Self {
        Self {
            rules,
            retained: HashSet::new(),
            grouping: Grouping::Rules,
            extract_misc: true,
        }
    }

    /// Builds a table from `(key, pattern)` pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self, ClassifyError> {
        let rules = pairs
            .into_iter()
            .map(|(key, pattern)| DomainRule::new(key, pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    pub fn with_retained<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retained.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_extract_misc(mut self, extract_misc: bool) -> Self {
        self.extract_misc = extract_misc;
        self
    }

    pub fn rules(&self) -> &[DomainRule] {
        &self.rules
    }

    pub fn grouping(&self) -> Grouping {
        self.grouping
    }

    /// Returns true if the name is on the deny-list
    pub fn is_retained(&self, name: &str) -> bool {
        self.retained.contains(name)
    }

    /// Maps a name to its domain. Ignores the deny-list.
    pub fn classify(&self, name: &str) -> DomainKey {
        self.find(name).unwrap_or(DomainKey::Misc)
    }

    /// Decides where a declaration goes
    pub fn assign(&self, name: &str) -> Assignment {
        if self.is_retained(name) {
            return Assignment::Retained;
        }

        if self.grouping == Grouping::Declaration {
            return Assignment::Domain {
                key: DomainKey::from_declaration(name),
                matched: true,
            };
        }

        match self.find(name) {
            Some(key) => Assignment::Domain { key, matched: true },
            None if self.extract_misc => Assignment::Domain {
                key: DomainKey::Misc,
                matched: false,
            },
            None => Assignment::Retained,
        }
    }

    fn find(&self, name: &str) -> Option<DomainKey> {
        self.rules
            .iter()
            .find(|rule| rule.matches(name))
            .map(|rule| rule.key.clone())
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
