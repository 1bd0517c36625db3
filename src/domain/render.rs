//! Rendering of group files and the composition root
//!
//! Both renderers are pure: the same inputs always give the same text. A
//! span's raw text is only touched by the one configured substitution, plus
//! the member rewrite and indentation when a group is wrapped.

use std::path::{Component, Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use super::classify::DomainKey;
use super::references::ReferenceSet;
use super::source::{DeclarationSpan, GeneratedFile};

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("Invalid substitution pattern '{pattern}': {message}")]
    InvalidSubstitution { pattern: String, message: String },
}

/// The single fixed rewrite applied to every extracted span
#[derive(Debug, Clone)]
pub struct Substitution {
    pattern: Regex,
    replacement: String,
}

impl Substitution {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, RenderError> {
        let regex = Regex::new(pattern).map_err(|e| RenderError::InvalidSubstitution {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            pattern: regex,
            replacement: replacement.to_string(),
        })
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }
}

/// Wraps a stateful group in a shared base declaration
#[derive(Debug, Clone)]
pub struct Wrapper {
    /// Opening line; `{Handle}`, `{Domain}` and `{domain}` are filled in
    pub open: String,
    pub close: String,
    /// Declaration heading rewritten to member form (`export async function ` -> `async `)
    pub member_from: Option<String>,
    pub member_to: String,
    pub indent: String,
}

/// Import line templates; `{names}`, `{name}` and `{module}` are filled in
#[derive(Debug, Clone)]
pub struct ImportTemplates {
    pub named: String,
    pub namespace: String,
    /// Template for the root's per-group lines; falls back to `named`
    pub root: Option<String>,
}

impl Default for ImportTemplates {
    fn default() -> Self {
        Self {
            named: "import { {names} } from \"{module}\";".to_string(),
            namespace: "import * as {name} from \"{module}\";".to_string(),
            root: None,
        }
    }
}

/// One line of the root that pulls in a generated group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootImport {
    pub names: Vec<String>,
    pub module: String,
}

/// What the composition root is assembled from
#[derive(Debug, Clone, Copy)]
pub struct RootParts<'a> {
    pub preamble: &'a str,
    pub imports: &'a [RootImport],
    /// Non-extracted text in source order
    pub retained: &'a [String],
    pub aggregator: Option<&'a DeclarationSpan>,
    pub trailing: &'a str,
}

/// Renders generated files from spans and inferred references
#[derive(Debug, Clone)]
pub struct Renderer {
    pub extension: String,
    /// Documentation header; `{Domain}`, `{domain}`, `{Handle}` and `{source}` are filled in
    pub header: String,
    pub export_prefix: Option<String>,
    pub substitution: Option<Substitution>,
    pub wrapper: Option<Wrapper>,
    /// Name of a wrapped group's public handle, e.g. `{Domain}Repository`
    pub handle: String,
    pub imports: ImportTemplates,
    pub root_banner: Option<String>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            extension: "ts".to_string(),
            header: "/**\n * {Domain}\n * Auto-generated from {source}\n */".to_string(),
            export_prefix: None,
            substitution: None,
            wrapper: None,
            handle: "{domain}".to_string(),
            imports: ImportTemplates::default(),
            root_banner: None,
        }
    }
}

impl Renderer {
    /// File name of a group relative to the output directory
    pub fn file_name(&self, key: &DomainKey) -> PathBuf {
        PathBuf::from(format!("{}.{}", key, self.extension))
    }

    /// Names the root imports from a group
    pub fn public_names(&self, key: &DomainKey, spans: &[DeclarationSpan]) -> Vec<String> {
        if self.wrapper.is_some() {
            vec![self.handle_for(key)]
        } else {
            spans.iter().map(|s| s.name.clone()).collect()
        }
    }

    pub fn handle_for(&self, key: &DomainKey) -> String {
        fill_key(&self.handle, key)
    }

    /// Renders one domain group into its own file
    pub fn render_group(
        &self,
        key: &DomainKey,
        spans: &[DeclarationSpan],
        refs: &ReferenceSet,
        source_name: &str,
    ) -> GeneratedFile {
        let mut out = String::new();

        let import_lines = self.import_lines(refs);
        for line in &import_lines {
            out.push_str(line);
            out.push('\n');
        }
        if !import_lines.is_empty() {
            out.push('\n');
        }

        let handle = self.handle_for(key);
        out.push_str(&self.fill(&self.header, key, &handle, source_name));
        out.push('\n');

        match &self.wrapper {
            None => {
                for (i, span) in spans.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    let text = self.substitute(&span.raw_text);
                    if let Some(prefix) = &self.export_prefix {
                        if !text.starts_with(prefix.as_str()) {
                            out.push_str(prefix);
                        }
                    }
                    push_terminated(&mut out, &text);
                }
            }
            Some(wrapper) => {
                out.push_str(&self.fill(&wrapper.open, key, &handle, source_name));
                out.push('\n');
                for (i, span) in spans.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    let text = as_member(wrapper, &self.substitute(&span.raw_text));
                    push_terminated(&mut out, &indent(&text, &wrapper.indent));
                }
                out.push_str(&wrapper.close);
                out.push('\n');
            }
        }

        GeneratedFile::new(self.file_name(key), out)
    }

    /// Renders the rewritten original file
    pub fn render_root(&self, parts: RootParts<'_>) -> String {
        let mut out = String::new();

        if !parts.preamble.is_empty() {
            push_terminated(&mut out, parts.preamble);
        }

        if !parts.imports.is_empty() {
            if !out.is_empty() && !out.ends_with("\n\n") {
                out.push('\n');
            }
            if let Some(banner) = &self.root_banner {
                out.push_str(banner);
                out.push('\n');
            }
            let template = self.imports.root.as_deref().unwrap_or(&self.imports.named);
            for import in parts.imports {
                let line = template
                    .replace("{names}", &import.names.join(", "))
                    .replace("{module}", &import.module);
                out.push_str(&line);
                out.push('\n');
            }
        }

        for chunk in parts.retained {
            let chunk = chunk.trim_matches(|c| c == '\n' || c == '\r');
            if chunk.trim().is_empty() {
                continue;
            }
            out.push('\n');
            out.push_str(chunk);
            out.push('\n');
        }

        if let Some(aggregator) = parts.aggregator {
            out.push('\n');
            out.push_str(&aggregator.raw_text);
        }

        out.push_str(parts.trailing);
        out
    }

    /// One line per module, sorted by module path
    pub fn import_lines(&self, refs: &ReferenceSet) -> Vec<String> {
        let mut lines = Vec::new();
        for (module, imports) in refs.modules() {
            for name in &imports.namespaces {
                lines.push(
                    self.imports
                        .namespace
                        .replace("{name}", name)
                        .replace("{module}", module),
                );
            }
            if !imports.named.is_empty() {
                let names: Vec<&str> = imports.named.iter().map(String::as_str).collect();
                lines.push(
                    self.imports
                        .named
                        .replace("{names}", &names.join(", "))
                        .replace("{module}", module),
                );
            }
        }
        lines
    }

    fn substitute(&self, text: &str) -> String {
        match &self.substitution {
            Some(sub) => sub.apply(text),
            None => text.to_string(),
        }
    }

    fn fill(&self, template: &str, key: &DomainKey, handle: &str, source_name: &str) -> String {
        fill_key(template, key)
            .replace("{Handle}", handle)
            .replace("{source}", source_name)
    }
}

fn fill_key(template: &str, key: &DomainKey) -> String {
    template
        .replace("{Domain}", &key.title())
        .replace("{domain}", key.as_str())
}

fn as_member(wrapper: &Wrapper, text: &str) -> String {
    match &wrapper.member_from {
        Some(from) if text.starts_with(from.as_str()) => {
            format!("{}{}", wrapper.member_to, &text[from.len()..])
        }
        _ => text.to_string(),
    }
}

fn indent(text: &str, prefix: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect()
}

fn push_terminated(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

/// Module specifier for `target` as seen from a file in `from_dir`
///
/// The final extension is dropped (`task.repository.ts` -> `./task.repository`).
/// Both paths are compared lexically; pass them in the same form.
pub fn module_specifier(from_dir: &Path, target: &Path) -> String {
    let from = lexical(from_dir);
    let to = lexical(&target.with_extension(""));

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(from.len() - common)
        .collect();
    parts.extend(to[common..].iter().cloned());

    let joined = parts.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{joined}")
    }
}

fn lexical(path: &Path) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else {
                    parts.push("..".to_string());
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                parts.push(component.as_os_str().to_string_lossy().into_owned());
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::references::ImportKind;

    fn span(name: &str, start: usize, text: &str) -> DeclarationSpan {
        DeclarationSpan {
            name: name.to_string(),
            start_line: start,
            end_line: start + text.lines().count() - 1,
            raw_text: text.to_string(),
        }
    }

    fn key(k: &str) -> DomainKey {
        DomainKey::parse(k).unwrap()
    }

    #[test]
    fn plain_group_keeps_source_order() {
        let renderer = Renderer {
            export_prefix: Some("export ".to_string()),
            ..Renderer::default()
        };
        let mut refs = ReferenceSet::new();
        refs.insert("zod", "z", ImportKind::Named);

        let spans = vec![
            span("createTask", 0, "const createTask = 1;\n"),
            span("updateTask", 3, "export const updateTask = 2;\n"),
        ];
        let file = renderer.render_group(&key("task"), &spans, &refs, "routers.ts");

        assert_eq!(file.relative_path, PathBuf::from("task.ts"));
        assert_eq!(
            file.content,
            "import { z } from \"zod\";\n\n/**\n * Task\n * Auto-generated from routers.ts\n */\nexport const createTask = 1;\n\nexport const updateTask = 2;\n"
        );
    }

    #[test]
    fn substitution_is_applied_to_every_span() {
        let renderer = Renderer {
            substitution: Some(Substitution::new(r"\bdb\.", "this.db.").unwrap()),
            ..Renderer::default()
        };
        let spans = vec![span("a", 0, "db.select(); mydb.x(); db.insert();\n")];
        let file = renderer.render_group(&key("task"), &spans, &ReferenceSet::new(), "db.ts");

        assert!(file.content.contains("this.db.select(); mydb.x(); this.db.insert();"));
    }

    #[test]
    fn wrapped_group_becomes_class() {
        let renderer = Renderer {
            extension: "repository.ts".to_string(),
            handle: "{Domain}Repository".to_string(),
            wrapper: Some(Wrapper {
                open: "export class {Handle} extends BaseRepository {".to_string(),
                close: "}".to_string(),
                member_from: Some("export async function ".to_string()),
                member_to: "async ".to_string(),
                indent: "  ".to_string(),
            }),
            ..Renderer::default()
        };
        let spans = vec![span(
            "createDefect",
            0,
            "export async function createDefect() {\n\n  return 1;\n}\n",
        )];
        let file = renderer.render_group(&key("defect"), &spans, &ReferenceSet::new(), "db.ts");

        assert_eq!(file.relative_path, PathBuf::from("defect.repository.ts"));
        assert!(file.content.contains(
            "export class DefectRepository extends BaseRepository {\n  async createDefect() {\n\n    return 1;\n  }\n}\n"
        ));
        assert_eq!(renderer.public_names(&key("defect"), &spans), vec!["DefectRepository"]);
    }

    #[test]
    fn import_lines_are_sorted_by_module() {
        let renderer = Renderer::default();
        let mut refs = ReferenceSet::new();
        refs.insert("zod", "z", ImportKind::Named);
        refs.insert("../db", "db", ImportKind::Namespace);
        refs.insert("drizzle-orm", "eq", ImportKind::Named);
        refs.insert("drizzle-orm", "and", ImportKind::Named);

        assert_eq!(
            renderer.import_lines(&refs),
            vec![
                "import * as db from \"../db\";",
                "import { and, eq } from \"drizzle-orm\";",
                "import { z } from \"zod\";",
            ]
        );
    }

    #[test]
    fn root_layout() {
        let renderer = Renderer {
            root_banner: Some("// Domain modules".to_string()),
            ..Renderer::default()
        };
        let aggregator = span(
            "appRouter",
            9,
            "export const appRouter = router({\n  task: taskRouter,\n});\n",
        );
        let imports = vec![RootImport {
            names: vec!["taskRouter".to_string()],
            module: "./routers/task".to_string(),
        }];
        let retained = vec!["\nconst helper = 1;\n\n".to_string(), "\n\n".to_string()];

        let root = renderer.render_root(RootParts {
            preamble: "import { router } from \"./trpc\";\n",
            imports: &imports,
            retained: &retained,
            aggregator: Some(&aggregator),
            trailing: "\nexport type AppRouter = typeof appRouter;\n",
        });

        assert_eq!(
            root,
            "import { router } from \"./trpc\";\n\n// Domain modules\nimport { taskRouter } from \"./routers/task\";\n\nconst helper = 1;\n\nexport const appRouter = router({\n  task: taskRouter,\n});\n\nexport type AppRouter = typeof appRouter;\n"
        );
    }

    #[test]
    fn module_specifiers() {
        assert_eq!(
            module_specifier(Path::new("/p/server"), Path::new("/p/server/routers/task.ts")),
            "./routers/task"
        );
        assert_eq!(
            module_specifier(Path::new("/p/server"), Path::new("/p/server/repositories/task.repository.ts")),
            "./repositories/task.repository"
        );
        assert_eq!(
            module_specifier(Path::new("/p/server/db"), Path::new("/p/lib/task.ts")),
            "../../lib/task"
        );
        assert_eq!(
            module_specifier(Path::new("/p/server"), Path::new("/p/server/./out/../out/x.ts")),
            "./out/x"
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let renderer = Renderer::default();
        let spans = vec![span("a", 0, "const a = 1;\n")];
        let refs = ReferenceSet::new();

        let first = renderer.render_group(&key("misc"), &spans, &refs, "x.ts");
        let second = renderer.render_group(&key("misc"), &spans, &refs, "x.ts");
        assert_eq!(first, second);
    }
}
