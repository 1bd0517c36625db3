//! Partitioning engine core
//!
//! Scanning, classification, import inference and rendering, without any I/O.

mod source;
mod scanner;
mod classify;
mod references;
mod render;
mod plan;

pub use source::{DeclarationSpan, GeneratedFile, Residue, SourceDocument};
pub use scanner::{ScanFailure, ScanOutcome, ScanPatterns, Scanner};
pub use classify::{Assignment, ClassifyError, DomainKey, DomainRule, Grouping, RuleTable};
pub use references::{Catalog, CatalogSymbol, EntityCatalog, ImportKind, ModuleImports, ReferenceError, ReferenceSet};
pub use render::{module_specifier, ImportTemplates, RenderError, Renderer, RootImport, RootParts, Substitution, Wrapper};
pub use plan::{DomainGroup, GroupPlan, GroupedDeclarations, Layout, PartitionPlan, Partitioner};
