//! Import inference from a static catalog
//!
//! There is no symbol table here. A group needs a catalog symbol when the
//! symbol's marker occurs anywhere in the group's text, and it needs an
//! entity when an entity pattern captures that entity's name. Unused imports
//! are possible, so are missing ones for references the catalog does not know.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ReferenceError {
    #[error("Entity pattern '{0}' needs a capture group for the entity name")]
    MissingCapture(String),

    #[error("Invalid entity pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// How a symbol is brought into scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportKind {
    /// `import { name } from "module"`
    #[default]
    Named,
    /// `import * as name from "module"`
    Namespace,
}

/// A symbol the catalog knows how to import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSymbol {
    pub name: String,
    pub module: String,
    /// Text whose presence means the symbol is used
    pub marker: String,
    pub kind: ImportKind,
}

impl CatalogSymbol {
    pub fn named(name: &str, module: &str) -> Self {
        Self {
            name: name.to_string(),
            module: module.to_string(),
            marker: name.to_string(),
            kind: ImportKind::Named,
        }
    }

    pub fn namespace(name: &str, module: &str) -> Self {
        Self {
            kind: ImportKind::Namespace,
            ..Self::named(name, module)
        }
    }

    pub fn with_marker(mut self, marker: &str) -> Self {
        self.marker = marker.to_string();
        self
    }
}

/// Entity names found through textual patterns such as `from(tasks)`
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    patterns: Vec<Regex>,
    default_module: Option<String>,
    modules: BTreeMap<String, String>,
}

impl EntityCatalog {
    pub fn new(patterns: &[String]) -> Result<Self, ReferenceError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let regex = Regex::new(p).map_err(|e| ReferenceError::InvalidPattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })?;
                if regex.captures_len() < 2 {
                    return Err(ReferenceError::MissingCapture(p.clone()));
                }
                Ok(regex)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            default_module: None,
            modules: BTreeMap::new(),
        })
    }

    /// Module used for entities without an explicit entry
    pub fn with_default_module(mut self, module: Option<String>) -> Self {
        self.default_module = module;
        self
    }

    /// Explicit `entity -> module` entries
    pub fn with_modules(mut self, modules: BTreeMap<String, String>) -> Self {
        self.modules = modules;
        self
    }

    /// Resolves an entity to its defining module
    pub fn module_for(&self, entity: &str) -> Option<&str> {
        self.modules
            .get(entity)
            .map(String::as_str)
            .or(self.default_module.as_deref())
    }

    /// Returns every entity name captured in the text
    pub fn scan(&self, text: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        for pattern in &self.patterns {
            for caps in pattern.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    found.insert(m.as_str().to_string());
                }
            }
        }
        found
    }
}

/// Names imported from one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleImports {
    pub named: BTreeSet<String>,
    pub namespaces: BTreeSet<String>,
}

/// The imports a rendered group needs, keyed by module path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    modules: BTreeMap<String, ModuleImports>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: &str, name: &str, kind: ImportKind) {
        let entry = self.modules.entry(module.to_string()).or_default();
        match kind {
            ImportKind::Named => entry.named.insert(name.to_string()),
            ImportKind::Namespace => entry.namespaces.insert(name.to_string()),
        };
    }

    /// Modules in sorted order
    pub fn modules(&self) -> impl Iterator<Item = (&str, &ModuleImports)> {
        self.modules.iter().map(|(module, imports)| (module.as_str(), imports))
    }

    /// Returns true if any module provides the name
    pub fn contains(&self, name: &str) -> bool {
        self.modules
            .values()
            .any(|m| m.named.contains(name) || m.namespaces.contains(name))
    }

    /// Total imported names
    pub fn len(&self) -> usize {
        self.modules
            .values()
            .map(|m| m.named.len() + m.namespaces.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Everything the inferencer knows about external symbols
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    base: Vec<CatalogSymbol>,
    optional: Vec<CatalogSymbol>,
    entities: EntityCatalog,
}

impl Catalog {
    pub fn new(base: Vec<CatalogSymbol>, optional: Vec<CatalogSymbol>, entities: EntityCatalog) -> Self {
        Self {
            base,
            optional,
            entities,
        }
    }

    pub fn base(&self) -> &[CatalogSymbol] {
        &self.base
    }

    pub fn optional(&self) -> &[CatalogSymbol] {
        &self.optional
    }

    /// Infers the imports needed by a group's concatenated text
    pub fn infer(&self, body: &str) -> ReferenceSet {
        let mut refs = ReferenceSet::new();

        for symbol in &self.base {
            refs.insert(&symbol.module, &symbol.name, symbol.kind);
        }

        for symbol in self.optional.iter().filter(|s| body.contains(&s.marker)) {
            refs.insert(&symbol.module, &symbol.name, symbol.kind);
        }

        for entity in self.entities.scan(body) {
            if let Some(module) = self.entities.module_for(&entity) {
                refs.insert(module, &entity, ImportKind::Named);
            }
        }

        refs
    }
}
