//! # Storage Layer
//!
//! Everything that touches the filesystem.
//!
//! ## Files
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Project config | TOML or YAML | `.partition.toml` / `.partition.yaml`, nearest ancestor |
//! | Global config | TOML | `<config dir>/partition/config.toml` |
//! | Group files | source text | `<out>/<domain>.<extension>` |
//! | Backup | verbatim copy | `<source>.backup` |
//!
//! ## Write Safety
//!
//! - The backup is verified against the original (blake3) before anything else
//! - All writes are atomic (temp file + rename)
//! - The original is replaced only after every group file is written
//! - There is no locking; never partition the same file from two processes
//!
//! ## Key Types
//!
//! - [`Config`] - Project and global configuration
//! - [`ProfileConfig`] - One partitioning profile, compiled into a [`crate::domain::Partitioner`]
//! - [`Writer`] - Backup, commit and restore
//! - [`partition()`] - A complete run producing a [`PartitionReport`]

mod config;
mod writer;
mod partition;

pub use config::{
    builtin_profiles, CheckConfig, ClassifyConfig, Config, ConfigError, DefaultFormat, GlobalConfig, GroupingMode,
    ProfileConfig, ProjectConfig, ReferenceConfig, RenderConfig, RuleConfig, ScanConfig, SubstitutionConfig,
    SymbolConfig, WrapConfig, DEFAULT_PROFILE, PROJECT_CONFIG_FILES,
};
pub use writer::{CommitError, CommitReport, WriteError, Writer};
pub use partition::{partition, plan_file, GroupSummary, PartitionOptions, PartitionReport};
