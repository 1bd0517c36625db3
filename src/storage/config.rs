//! Configuration handling for partition
//!
//! Profiles come from two places: the built-in `router` and `repository`
//! profiles, and `.partition.toml` (or `.partition.yaml`) found by walking up
//! from the current directory. A project profile replaces a built-in of the
//! same name. User-wide settings live in `~/.config/partition/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    Catalog, CatalogSymbol, EntityCatalog, Grouping, ImportTemplates, Partitioner, Renderer, RuleTable, ScanPatterns,
    Scanner, Substitution, Wrapper, DomainRule,
};
use crate::oracle::CheckCommand;

/// File names searched for when walking up, in order of preference
pub const PROJECT_CONFIG_FILES: [&str; 3] = [".partition.toml", ".partition.yaml", ".partition.yml"];

/// Profile used when neither the command line nor the project names one
pub const DEFAULT_PROFILE: &str = "repository";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown profile '{name}' (available: {available})")]
    UnknownProfile { name: String, available: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid profile '{profile}': {message}")]
    InvalidProfile { profile: String, message: String },
}

impl ConfigError {
    fn invalid(profile: &str, message: impl ToString) -> Self {
        ConfigError::InvalidProfile {
            profile: profile.to_string(),
            message: message.to_string(),
        }
    }
}

/// How declarations are found
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Regex for a declaration's first line; group 1 captures the name
    pub introducer: String,

    /// Regex for the aggregator's first line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<String>,

    pub open_delimiter: char,
    pub close_delimiter: char,

    /// Token that must appear on a declaration's closing line
    pub closing_marker: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            introducer: r"^export (?:async )?function (\w+)".to_string(),
            aggregator: None,
            open_delimiter: '{',
            close_delimiter: '}',
            closing_marker: "}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    #[default]
    Rules,
    Declaration,
}

impl From<GroupingMode> for Grouping {
    fn from(mode: GroupingMode) -> Self {
        match mode {
            GroupingMode::Rules => Grouping::Rules,
            GroupingMode::Declaration => Grouping::Declaration,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleConfig {
    pub key: String,
    pub pattern: String,
}

/// How declarations are bucketed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifyConfig {
    pub grouping: GroupingMode,

    /// Ordered rules; the first match wins
    pub rules: Vec<RuleConfig>,

    /// Names that always stay in the root
    pub retain: Vec<String>,

    /// Write unmatched declarations to `misc` instead of keeping them in the root
    pub extract_misc: bool,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            grouping: GroupingMode::Rules,
            rules: Vec::new(),
            retain: Vec::new(),
            extract_misc: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolConfig {
    pub name: String,
    pub module: String,

    /// Text that signals use; defaults to the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,

    /// Import as `* as name`
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub namespace: bool,
}

impl SymbolConfig {
    fn named(name: &str, module: &str) -> Self {
        Self {
            name: name.to_string(),
            module: module.to_string(),
            marker: None,
            namespace: false,
        }
    }

    fn namespace(name: &str, module: &str) -> Self {
        Self {
            namespace: true,
            ..Self::named(name, module)
        }
    }

    fn marked(name: &str, module: &str, marker: &str) -> Self {
        Self {
            marker: Some(marker.to_string()),
            ..Self::named(name, module)
        }
    }

    fn to_symbol(&self) -> CatalogSymbol {
        let symbol = if self.namespace {
            CatalogSymbol::namespace(&self.name, &self.module)
        } else {
            CatalogSymbol::named(&self.name, &self.module)
        };
        match &self.marker {
            Some(marker) => symbol.with_marker(marker),
            None => symbol,
        }
    }
}

/// The static symbol and entity catalogs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Imported by every group
    pub base: Vec<SymbolConfig>,

    /// Imported when their marker occurs in a group
    pub symbols: Vec<SymbolConfig>,

    /// Regexes whose first group captures an entity name
    pub entity_patterns: Vec<String>,

    /// Module for entities without an entry in `entities`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_module: Option<String>,

    /// Explicit `entity = "module"` entries
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub entities: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubstitutionConfig {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WrapConfig {
    pub open: String,
    pub close: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_from: Option<String>,

    #[serde(default)]
    pub member_to: String,

    #[serde(default = "default_indent")]
    pub indent: String,
}

fn default_indent() -> String {
    "  ".to_string()
}

/// Output shape of generated files and the root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RenderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,

    /// Prefix added to spans that do not already start with it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitution: Option<SubstitutionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrap: Option<WrapConfig>,

    /// Public name of a wrapped group, e.g. `{Domain}Repository`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_named: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_namespace: Option<String>,

    /// Template for the root's per-group lines
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_import: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_banner: Option<String>,
}

/// External checker run before and after a write
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckConfig {
    pub command: Vec<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Regex counted once per matching output line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_pattern: Option<String>,

    /// Defaults to the directory holding the project config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    300
}

/// A complete set of settings for one kind of source file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Extension of generated files, without the leading dot
    pub extension: String,

    pub scan: ScanConfig,
    pub classify: ClassifyConfig,
    pub references: ReferenceConfig,
    pub render: RenderConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckConfig>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            description: None,
            extension: "ts".to_string(),
            scan: ScanConfig::default(),
            classify: ClassifyConfig::default(),
            references: ReferenceConfig::default(),
            render: RenderConfig::default(),
            check: None,
        }
    }
}

impl ProfileConfig {
    /// tRPC routers: one file per `const xRouter = router({ ... });`
    pub fn router() -> Self {
        let trpc = "../_core/trpc";
        let validation = "@shared/validationUtils";
        let status = "../taskStatusHelper";
        let downloads = "../downloadProject";
        let schemas = "@shared/validations";

        Self {
            description: Some("Split tRPC routers into one file per router".to_string()),
            extension: "ts".to_string(),
            scan: ScanConfig {
                introducer: r"^const (\w+Router) = router\(\{".to_string(),
                aggregator: Some(r"^export const (appRouter) = router\(\{".to_string()),
                open_delimiter: '{',
                close_delimiter: '}',
                closing_marker: "});".to_string(),
            },
            classify: ClassifyConfig {
                grouping: GroupingMode::Declaration,
                ..ClassifyConfig::default()
            },
            references: ReferenceConfig {
                base: vec![
                    SymbolConfig::named("z", "zod"),
                    SymbolConfig::named("TRPCError", "@trpc/server"),
                    SymbolConfig::named("protectedProcedure", trpc),
                    SymbolConfig::named("publicProcedure", trpc),
                    SymbolConfig::named("router", trpc),
                    SymbolConfig::named("roleBasedProcedure", trpc),
                    SymbolConfig::namespace("db", "../db"),
                ],
                symbols: vec![
                    SymbolConfig::named("validateTaskCreateInput", validation),
                    SymbolConfig::named("validateTaskUpdateInput", validation),
                    SymbolConfig::named("validateInspectionSubmission", validation),
                    SymbolConfig::named("validateDefectCreateInput", validation),
                    SymbolConfig::named("validateDefectUpdateInput", validation),
                    SymbolConfig::named("canEditDefect", "@shared/permissions"),
                    SymbolConfig::named("canDeleteDefect", "@shared/permissions"),
                    SymbolConfig::named("boolToInt", "../utils/typeHelpers.js"),
                    SymbolConfig::marked("getTaskDisplayStatus", status, "getTaskDisplayStatus("),
                    SymbolConfig::named("getTaskDisplayStatusLabel", status),
                    SymbolConfig::named("getTaskDisplayStatusColor", status),
                    SymbolConfig::named("storagePut", "../storage"),
                    SymbolConfig::named("notifyOwner", "../_core/notification"),
                    SymbolConfig::named("emitNotification", "../_core/socket"),
                    SymbolConfig::named("createNotification", "../notificationService"),
                    SymbolConfig::namespace("analyticsService", "../services/analytics.service"),
                    SymbolConfig::named("generateProjectExport", downloads),
                    SymbolConfig::named("generateProjectReport", downloads),
                    SymbolConfig::named("generateArchiveExcel", "../excelExport"),
                    SymbolConfig::named("checkArchiveWarnings", "../archiveNotifications"),
                    SymbolConfig::named("logger", "../logger"),
                    SymbolConfig::named("projectSchema", schemas),
                    SymbolConfig::named("taskSchema", schemas),
                    SymbolConfig::named("defectSchema", schemas),
                    SymbolConfig::named("inspectionSchema", schemas),
                ],
                ..ReferenceConfig::default()
            },
            render: RenderConfig {
                header: Some("/**\n * {Domain}\n * Auto-generated from {source}\n */".to_string()),
                export_prefix: Some("export ".to_string()),
                root_banner: Some("// Import feature-based routers".to_string()),
                ..RenderConfig::default()
            },
            check: Some(CheckConfig {
                command: vec!["npx".to_string(), "tsc".to_string(), "--noEmit".to_string()],
                timeout_secs: default_timeout_secs(),
                diagnostic_pattern: Some(r"error TS\d+".to_string()),
                working_dir: None,
            }),
        }
    }

    /// Drizzle data access: one repository class per domain
    pub fn repository() -> Self {
        let orm = "drizzle-orm";
        let rules = [
            ("task", "(Task|Dependency|Assignee|Follower)"),
            ("defect", "(Defect|CAR|PAR|NCR)"),
            (
                "inspection",
                "(Inspection|Checklist|ChecklistItem|ChecklistResult|Signature|Reinspection)",
            ),
            (
                "notification",
                "(Notification|PushSubscription|ScheduledNotification|NotificationSettings)",
            ),
            ("comment", "(Comment)"),
            ("attachment", "(Attachment)"),
            ("activity", "(Activity|ActivityLog)"),
            (
                "analytics",
                "(Analytics|Stats|Metrics|KPI|Performance|Quality|Risk|Trend|Dashboard)",
            ),
            ("archive", "(Archive)"),
            ("template", "(Template)"),
            ("escalation", "(Escalation)"),
            ("role", "(Role|Permission)"),
        ];
        let retain = [
            "upsertUser",
            "getUserByOpenId",
            "getUserById",
            "getAllUsers",
            "updateUserRole",
            "updateUserProfile",
            "updateUserNotificationSettings",
            "generateProjectCode",
            "createProject",
            "getProjectById",
            "getAllProjects",
            "getProjectsPaginated",
            "getProjectsByUser",
            "validateProjectCompleteness",
            "openProject",
            "getProjectStats",
            "getBatchProjectStats",
            "updateProject",
            "deleteProject",
            "archiveProject",
            "unarchiveProject",
            "getArchivedProjects",
            "addProjectMember",
            "getProjectMembers",
            "removeProjectMember",
            "updateProjectMemberRole",
            "getUserProjects",
            "bulkCreateUsers",
            "getDb",
            "closeDbConnection",
        ];

        Self {
            description: Some("Move data-access functions into per-domain repository classes".to_string()),
            extension: "repository.ts".to_string(),
            scan: ScanConfig {
                introducer: r"^export async function (\w+)".to_string(),
                aggregator: None,
                open_delimiter: '{',
                close_delimiter: '}',
                closing_marker: "}".to_string(),
            },
            classify: ClassifyConfig {
                grouping: GroupingMode::Rules,
                rules: rules
                    .iter()
                    .map(|(key, pattern)| RuleConfig {
                        key: key.to_string(),
                        pattern: pattern.to_string(),
                    })
                    .collect(),
                retain: retain.iter().map(|s| s.to_string()).collect(),
                extract_misc: false,
            },
            references: ReferenceConfig {
                base: ["eq", "and", "desc", "asc", "count", "isNull", "sql"]
                    .iter()
                    .map(|name| SymbolConfig::named(name, orm))
                    .chain(std::iter::once(SymbolConfig::named("BaseRepository", "./base.repository")))
                    .collect(),
                symbols: vec![
                    SymbolConfig::named("inArray", orm),
                    SymbolConfig::marked("like", orm, "like("),
                    SymbolConfig::marked("or", orm, "or("),
                    SymbolConfig::marked("gt", orm, "gt("),
                    SymbolConfig::marked("gte", orm, "gte("),
                    SymbolConfig::marked("lt", orm, "lt("),
                    SymbolConfig::marked("lte", orm, "lte("),
                    SymbolConfig::named("bigIntToNumber", "../utils/bigint"),
                    SymbolConfig::named("boolToInt", "../utils/typeHelpers"),
                ],
                entity_patterns: vec![r"from\((\w+)\)".to_string(), r"Join\((\w+),".to_string()],
                entity_module: Some("../../drizzle/schema".to_string()),
                entities: BTreeMap::new(),
            },
            render: RenderConfig {
                header: Some("/**\n * {Handle}\n * Auto-generated from {source}\n */".to_string()),
                substitution: Some(SubstitutionConfig {
                    pattern: r"\bdb\.".to_string(),
                    replacement: "this.db.".to_string(),
                }),
                wrap: Some(WrapConfig {
                    open: "export class {Handle} extends BaseRepository {".to_string(),
                    close: "}".to_string(),
                    member_from: Some("export async function ".to_string()),
                    member_to: "async ".to_string(),
                    indent: default_indent(),
                }),
                handle: Some("{Domain}Repository".to_string()),
                root_import: Some("export { {names} } from \"{module}\";".to_string()),
                ..RenderConfig::default()
            },
            check: None,
        }
    }

    /// Builds the engine described by this profile
    pub fn compile(&self, name: &str) -> Result<Partitioner, ConfigError> {
        Ok(Partitioner::new(
            self.compile_scanner(name)?,
            self.compile_rules(name)?,
            self.compile_catalog(name)?,
            self.compile_renderer(name)?,
        ))
    }

    fn compile_scanner(&self, name: &str) -> Result<Scanner, ConfigError> {
        let scan = &self.scan;
        if scan.open_delimiter == scan.close_delimiter {
            return Err(ConfigError::invalid(name, "open and close delimiters must differ"));
        }
        if scan.closing_marker.is_empty() {
            return Err(ConfigError::invalid(name, "closing marker must not be empty"));
        }

        let introducer = compile_pattern(name, "introducer", &scan.introducer)?;
        if introducer.captures_len() < 2 {
            return Err(ConfigError::invalid(
                name,
                format!("introducer '{}' needs a capture group for the name", scan.introducer),
            ));
        }
        let aggregator = scan
            .aggregator
            .as_deref()
            .map(|p| compile_pattern(name, "aggregator", p))
            .transpose()?;

        Ok(Scanner::new(ScanPatterns {
            introducer,
            aggregator,
            open: scan.open_delimiter,
            close: scan.close_delimiter,
            closing_marker: scan.closing_marker.clone(),
        }))
    }

    fn compile_rules(&self, name: &str) -> Result<RuleTable, ConfigError> {
        let classify = &self.classify;
        let rules = classify
            .rules
            .iter()
            .map(|r| DomainRule::new(&r.key, &r.pattern))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::invalid(name, e))?;

        Ok(RuleTable::new(rules)
            .with_retained(classify.retain.iter().cloned())
            .with_grouping(classify.grouping.into())
            .with_extract_misc(classify.extract_misc))
    }

    fn compile_catalog(&self, name: &str) -> Result<Catalog, ConfigError> {
        let refs = &self.references;
        let entities = EntityCatalog::new(&refs.entity_patterns)
            .map_err(|e| ConfigError::invalid(name, e))?
            .with_default_module(refs.entity_module.clone())
            .with_modules(refs.entities.clone());

        Ok(Catalog::new(
            refs.base.iter().map(SymbolConfig::to_symbol).collect(),
            refs.symbols.iter().map(SymbolConfig::to_symbol).collect(),
            entities,
        ))
    }

    fn compile_renderer(&self, name: &str) -> Result<Renderer, ConfigError> {
        let render = &self.render;
        let defaults = Renderer::default();
        let import_defaults = ImportTemplates::default();

        if self.extension.trim().is_empty() {
            return Err(ConfigError::invalid(name, "extension must not be empty"));
        }

        let substitution = render
            .substitution
            .as_ref()
            .map(|s| Substitution::new(&s.pattern, &s.replacement))
            .transpose()
            .map_err(|e| ConfigError::invalid(name, e))?;

        let wrapper = render.wrap.as_ref().map(|w| Wrapper {
            open: w.open.clone(),
            close: w.close.clone(),
            member_from: w.member_from.clone(),
            member_to: w.member_to.clone(),
            indent: w.indent.clone(),
        });

        Ok(Renderer {
            extension: self.extension.trim_start_matches('.').to_string(),
            header: render.header.clone().unwrap_or(defaults.header),
            export_prefix: render.export_prefix.clone(),
            substitution,
            wrapper,
            handle: render.handle.clone().unwrap_or(defaults.handle),
            imports: ImportTemplates {
                named: render.import_named.clone().unwrap_or(import_defaults.named),
                namespace: render.import_namespace.clone().unwrap_or(import_defaults.namespace),
                root: render.root_import.clone(),
            },
            root_banner: render.root_banner.clone(),
        })
    }

    /// The configured checker, if any
    pub fn check_command(&self, name: &str, base_dir: Option<&Path>) -> Result<Option<CheckCommand>, ConfigError> {
        let Some(check) = &self.check else {
            return Ok(None);
        };

        let working_dir = match (&check.working_dir, base_dir) {
            (Some(dir), Some(base)) if dir.is_relative() => Some(base.join(dir)),
            (Some(dir), _) => Some(dir.clone()),
            (None, base) => base.map(Path::to_path_buf),
        };

        let command = CheckCommand::new(&check.command, Duration::from_secs(check.timeout_secs))
            .and_then(|c| c.with_diagnostic_pattern(check.diagnostic_pattern.as_deref()))
            .map_err(|e| ConfigError::invalid(name, e))?
            .with_working_dir(working_dir);

        Ok(Some(command))
    }
}

fn compile_pattern(profile: &str, what: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::invalid(profile, format!("invalid {what} pattern: {e}")))
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Profile used when `--profile` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl ProjectConfig {
    /// A config holding every built-in profile, as written by `partition init`
    pub fn starter() -> Self {
        Self {
            default_profile: Some(DEFAULT_PROFILE.to_string()),
            profiles: builtin_profiles(),
        }
    }

    /// Renders the starter file with a short explanatory header
    pub fn starter_toml() -> Result<String> {
        let body = toml::to_string_pretty(&Self::starter()).context("Failed to serialize starter config")?;
        Ok(format!(
            "# partition configuration\n\
             #\n\
             # Profiles here replace built-in profiles with the same name.\n\
             # Run `partition scan <file>` to preview what a profile finds.\n\n{}",
            body
        ))
    }
}

/// Every profile shipped with the binary
pub fn builtin_profiles() -> BTreeMap<String, ProfileConfig> {
    BTreeMap::from([
        ("repository".to_string(), ProfileConfig::repository()),
        ("router".to_string(), ProfileConfig::router()),
    ])
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: DefaultFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefaultFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    /// The project config file that was loaded, if any
    pub path: Option<PathBuf>,
}

impl Config {
    /// Loads the global config plus `explicit`, or the nearest project config
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let global = Self::load_global()?;

        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let cwd = std::env::current_dir().context("Failed to read current directory")?;
                Self::find_project_config(&cwd)
            }
        };

        let project = match &path {
            Some(path) => Self::load_project_file(path)?,
            None => ProjectConfig::default(),
        };

        Ok(Self { project, global, path })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "partition", "partition").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads user-wide settings; missing file means defaults
    pub fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse {
                path: config_path.display().to_string(),
                message: e.to_string(),
            })
            .context("Failed to parse global config")
    }

    /// Parses a project config file; YAML when the extension says so
    pub fn load_project_file(path: &Path) -> Result<ProjectConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read project config: {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let parsed = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        };

        parsed
            .map_err(|message| ConfigError::Parse {
                path: path.display().to_string(),
                message,
            })
            .context("Failed to parse project config")
    }

    /// Walks up from `start` looking for a project config file
    pub fn find_project_config(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            for name in PROJECT_CONFIG_FILES {
                let candidate = current.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Directory holding the loaded project config
    pub fn base_dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }

    /// Names of every available profile
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = builtin_profiles().into_keys().collect();
        for name in self.project.profiles.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    /// Resolves a profile: the explicit name, then the project default, then the built-in default
    pub fn profile(&self, requested: Option<&str>) -> Result<(String, ProfileConfig), ConfigError> {
        let name = requested
            .map(str::to_string)
            .or_else(|| self.project.default_profile.clone())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        if let Some(profile) = self.project.profiles.get(&name) {
            return Ok((name, profile.clone()));
        }

        builtin_profiles()
            .remove(&name)
            .map(|profile| (name.clone(), profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                name,
                available: self.profile_names().join(", "),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtins_compile() {
        for (name, profile) in builtin_profiles() {
            assert!(profile.compile(&name).is_ok(), "{name} failed to compile");
        }
    }

    #[test]
    fn default_profile_is_repository() {
        let config = Config::default();
        let (name, profile) = config.profile(None).unwrap();

        assert_eq!(name, "repository");
        assert_eq!(profile.extension, "repository.ts");
        assert!(!profile.classify.extract_misc);
    }

    #[test]
    fn unknown_profile() {
        let err = Config::default().profile(Some("nope")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile { .. }));
        assert!(err.to_string().contains("repository, router"));
    }

    #[test]
    fn parse_project_config() {
        let toml = r#"
default_profile = "services"

[profiles.services]
extension = "service.ts"

[profiles.services.scan]
introducer = '^export function (\w+)'

[profiles.services.classify]
rules = [
  { key = "task", pattern = "Task" },
  { key = "defect", pattern = "Defect" },
]
retain = ["getDb"]
"#;

        let project: ProjectConfig = toml::from_str(toml).unwrap();
        let config = Config {
            project,
            ..Config::default()
        };

        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "services");
        assert_eq!(profile.extension, "service.ts");
        assert_eq!(profile.scan.closing_marker, "}");
        assert_eq!(profile.classify.rules.len(), 2);
        assert!(profile.classify.extract_misc);

        let engine = profile.compile(&name).unwrap();
        assert_eq!(engine.rules.classify("createTask").as_str(), "task");
        assert!(engine.rules.is_retained("getDb"));
    }

    #[test]
    fn project_profile_replaces_builtin() {
        let toml = r#"
[profiles.router]
extension = "mts"
"#;
        let project: ProjectConfig = toml::from_str(toml).unwrap();
        let config = Config {
            project,
            ..Config::default()
        };

        let (_, profile) = config.profile(Some("router")).unwrap();
        assert_eq!(profile.extension, "mts");
        assert!(profile.scan.aggregator.is_none());
    }

    #[test]
    fn yaml_project_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".partition.yaml");
        fs::write(
            &path,
            "default_profile: router\nprofiles:\n  router:\n    extension: ts\n    classify:\n      grouping: declaration\n",
        )
        .unwrap();

        let project = Config::load_project_file(&path).unwrap();
        assert_eq!(project.default_profile.as_deref(), Some("router"));
        assert_eq!(project.profiles["router"].classify.grouping, GroupingMode::Declaration);
    }

    #[test]
    fn find_project_config_walks_up() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".partition.toml"), "").unwrap();
        let sub_dir = dir.path().join("server").join("db");
        fs::create_dir_all(&sub_dir).unwrap();

        let found = Config::find_project_config(&sub_dir);
        assert_eq!(found, Some(dir.path().join(".partition.toml")));
    }

    #[test]
    fn same_delimiters_are_rejected() {
        let mut profile = ProfileConfig::default();
        profile.scan.close_delimiter = '{';

        let err = profile.compile("custom").unwrap_err();
        assert!(err.to_string().contains("delimiters must differ"));
    }

    #[test]
    fn introducer_needs_capture() {
        let mut profile = ProfileConfig::default();
        profile.scan.introducer = r"^export function \w+".to_string();

        assert!(matches!(
            profile.compile("custom"),
            Err(ConfigError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn invalid_rule_pattern() {
        let mut profile = ProfileConfig::default();
        profile.classify.rules.push(RuleConfig {
            key: "task".to_string(),
            pattern: "(Task".to_string(),
        });

        assert!(profile.compile("custom").is_err());
    }

    #[test]
    fn starter_round_trips() {
        let text = ProjectConfig::starter_toml().unwrap();
        assert!(text.starts_with("# partition configuration"));

        let parsed: ProjectConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, ProjectConfig::starter());
    }

    #[test]
    fn check_command_resolves_working_dir() {
        let mut profile = ProfileConfig::router();
        profile.check.as_mut().unwrap().working_dir = Some(PathBuf::from("client"));

        let command = profile
            .check_command("router", Some(Path::new("/app")))
            .unwrap()
            .unwrap();
        assert_eq!(command.display(), "npx tsc --noEmit");

        assert!(ProfileConfig::repository().check_command("repository", None).unwrap().is_none());
    }

    #[test]
    fn parse_global_config() {
        let config: GlobalConfig = toml::from_str("default_format = \"json\"\n").unwrap();
        assert_eq!(config.default_format, DefaultFormat::Json);
    }
}
