//! Partition planning
//!
//! Turns one source document into every generated file, entirely in memory.
//! Nothing here touches the filesystem; the writer persists the result.

use std::collections::HashMap;
use std::path::PathBuf;

use rayon::prelude::*;

use super::classify::{Assignment, DomainKey, RuleTable};
use super::references::{Catalog, ReferenceSet};
use super::render::{module_specifier, Renderer, RootImport, RootParts};
use super::scanner::{ScanFailure, ScanOutcome, Scanner};
use super::source::{DeclarationSpan, GeneratedFile, SourceDocument};

/// Declarations sharing a domain, in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainGroup {
    pub key: DomainKey,
    pub spans: Vec<DeclarationSpan>,
}

impl DomainGroup {
    /// Concatenated raw text of every span
    pub fn body(&self) -> String {
        self.spans.iter().map(|s| s.raw_text.as_str()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.spans.iter().map(|s| s.name.clone()).collect()
    }
}

/// Result of bucketing scanned declarations
#[derive(Debug, Clone, Default)]
pub struct GroupedDeclarations {
    /// Groups in order of first appearance
    pub groups: Vec<DomainGroup>,
    /// Declarations that stay in the root
    pub retained: Vec<DeclarationSpan>,
    /// Names that matched no rule and fell back to `misc`
    pub unmatched: Vec<String>,
}

/// Where the root and the generated files live, in the same path form
#[derive(Debug, Clone)]
pub struct Layout {
    pub root_dir: PathBuf,
    pub out_dir: PathBuf,
}

/// One rendered group
#[derive(Debug, Clone)]
pub struct GroupPlan {
    pub key: DomainKey,
    pub declarations: Vec<String>,
    pub references: ReferenceSet,
    /// Path relative to the output directory
    pub file: GeneratedFile,
}

/// Everything a run would write
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    pub groups: Vec<GroupPlan>,
    pub root: GeneratedFile,
    pub retained: Vec<String>,
    pub unmatched: Vec<String>,
    pub failures: Vec<ScanFailure>,
    pub aggregator: Option<String>,
}

impl PartitionPlan {
    pub fn declarations_extracted(&self) -> usize {
        self.groups.iter().map(|g| g.declarations.len()).sum()
    }

    /// True when nothing would be extracted
    pub fn is_noop(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn failure_names(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.name().to_string()).collect()
    }
}

/// The compiled engine: scanner, rules, catalog and renderer
#[derive(Debug, Clone)]
pub struct Partitioner {
    pub scanner: Scanner,
    pub rules: RuleTable,
    pub catalog: Catalog,
    pub renderer: Renderer,
}

impl Partitioner {
    pub fn new(scanner: Scanner, rules: RuleTable, catalog: Catalog, renderer: Renderer) -> Self {
        Self {
            scanner,
            rules,
            catalog,
            renderer,
        }
    }

    /// Buckets scanned declarations by domain
    pub fn group(&self, outcome: &ScanOutcome) -> GroupedDeclarations {
        let mut grouping = GroupedDeclarations::default();
        let mut index: HashMap<DomainKey, usize> = HashMap::new();

        for span in &outcome.declarations {
            match self.rules.assign(&span.name) {
                Assignment::Retained => grouping.retained.push(span.clone()),
                Assignment::Domain { key, matched } => {
                    if !matched {
                        grouping.unmatched.push(span.name.clone());
                    }
                    let slot = *index.entry(key.clone()).or_insert_with(|| {
                        grouping.groups.push(DomainGroup {
                            key,
                            spans: Vec::new(),
                        });
                        grouping.groups.len() - 1
                    });
                    grouping.groups[slot].spans.push(span.clone());
                }
            }
        }

        grouping
    }

    /// Plans a full run for one document
    pub fn plan(&self, doc: &SourceDocument, layout: &Layout) -> PartitionPlan {
        let outcome = self.scanner.scan(doc);
        let grouping = self.group(&outcome);
        let source_name = doc.file_name();

        let groups: Vec<GroupPlan> = grouping
            .groups
            .par_iter()
            .map(|group| {
                let references = self.catalog.infer(&group.body());
                let file = self
                    .renderer
                    .render_group(&group.key, &group.spans, &references, &source_name);
                GroupPlan {
                    key: group.key.clone(),
                    declarations: group.names(),
                    references,
                    file,
                }
            })
            .collect();

        let root_path = PathBuf::from(&source_name);
        let root = if groups.is_empty() {
            GeneratedFile::new(root_path, doc.text())
        } else {
            let imports: Vec<RootImport> = grouping
                .groups
                .iter()
                .zip(&groups)
                .map(|(group, plan)| RootImport {
                    names: self.renderer.public_names(&group.key, &group.spans),
                    module: module_specifier(&layout.root_dir, &layout.out_dir.join(&plan.file.relative_path)),
                })
                .collect();

            let retained = retained_chunks(&outcome, &grouping.retained);
            let content = self.renderer.render_root(RootParts {
                preamble: &outcome.preamble,
                imports: &imports,
                retained: &retained,
                aggregator: outcome.aggregator.as_ref(),
                trailing: &outcome.trailing,
            });
            GeneratedFile::new(root_path, content)
        };

        PartitionPlan {
            groups,
            root,
            retained: grouping.retained.iter().map(|s| s.name.clone()).collect(),
            unmatched: grouping.unmatched,
            failures: outcome.failures,
            aggregator: outcome.aggregator.map(|a| a.name),
        }
    }
}

/// Residue and retained declarations, merged back into source order
fn retained_chunks(outcome: &ScanOutcome, retained: &[DeclarationSpan]) -> Vec<String> {
    let mut chunks: Vec<(usize, &str)> = outcome
        .residue
        .iter()
        .filter(|r| !r.is_blank())
        .map(|r| (r.start_line, r.text.as_str()))
        .chain(retained.iter().map(|s| (s.start_line, s.raw_text.as_str())))
        .collect();
    chunks.sort_by_key(|(line, _)| *line);
    chunks.into_iter().map(|(_, text)| text.to_string()).collect()
}
